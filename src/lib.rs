pub mod config;
pub mod connection;
pub mod exception;
pub mod file;
pub mod param;
pub mod process;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod server;
pub mod util;

pub use config::Config;
pub use connection::{Connection, ConnectionStats};
pub use exception::Exception;
pub use file::{FileResource, MimeClassifier, Resolver};
pub use param::{Generation, HttpRequestMethod};
pub use request::Request;
pub use response::Response;
pub use scheduler::ThreadPool;
pub use server::{Server, ServerHandle};
