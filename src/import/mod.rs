pub mod model;
pub mod service;
pub mod uploader;

pub use model::{
    ActionResponse, ChunkRequest, ChunkResponse, DeleteRequest, ImportError, ImportSettings,
    TreeLookup,
};
pub use service::ImportService;
pub use uploader::{ChunkTransport, ChunkedUploader, HttpTransport, LocalTransport, UploadReport};
