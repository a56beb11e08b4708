pub mod access_repo;
pub mod parcel_repo;
pub mod report_repo;
pub mod upload_repo;

pub use access_repo::AccessRepository;
pub use parcel_repo::ParcelRepository;
pub use report_repo::ReportRepository;
pub use upload_repo::UploadRepository;
