pub mod remote_server;
pub mod remote_tree;
pub mod server_list;

pub use remote_server::RemoteServer;
pub use remote_tree::{RemoteServerTree, ServerSelection};
pub use server_list::RemoteServerList;
