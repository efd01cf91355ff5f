pub mod credential;
pub mod error;
pub mod init_data;
