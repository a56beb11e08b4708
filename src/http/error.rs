use crate::auth::AuthError;
use crate::export::ExportError;
use crate::grid::GridError;
use crate::import::ImportError;
use crate::parcel::ParcelError;
use crate::workbook::WorkbookError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Parcel(#[from] ParcelError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error("{0}")]
    BadRequest(String),
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingCredential | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => auth_status(e),
            ApiError::Import(ImportError::Auth(e)) => auth_status(e),
            ApiError::Import(ImportError::NoRecords | ImportError::UploadNotFound(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Import(ImportError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Parcel(
                ParcelError::InvalidKey(_) | ParcelError::EmptyGrid | ParcelError::InvalidAddress(_),
            ) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Parcel(ParcelError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ApiError::Parcel(ParcelError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Parcel(ParcelError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Grid(_) | ApiError::Workbook(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Export(ExportError::NoData) => StatusCode::NOT_FOUND,
            ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {:?}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
