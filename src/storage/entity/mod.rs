pub mod access_token;
pub mod parcel;
pub mod tree;
pub mod tree_report;
pub mod upload_batch;
pub mod user_role;

