use crate::import::{ImportService, ImportSettings};
use crate::parcel::ParcelService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub imports: Arc<ImportService>,
    pub parcels: Arc<ParcelService>,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, settings: ImportSettings) -> Self {
        Self {
            imports: Arc::new(ImportService::new(db.clone(), settings)),
            parcels: Arc::new(ParcelService::new(db.clone())),
            db,
        }
    }
}
