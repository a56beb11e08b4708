use crate::auth::{authenticate, Caller};
use crate::export::{export_file_name, trees_to_csv};
use crate::grid::{interpolate_slice, tree_color, Corner, RegimeRange, TreeAddress};
use crate::http::error::ApiError;
use crate::http::state::AppState;
use crate::import::{ChunkRequest, DeleteRequest};
use crate::parcel::service::REPORT_PAGE_SIZE;
use crate::parcel::ParcelKey;
use crate::storage::entity::tree_report;
use crate::workbook::parse_workbook_bytes;
use crate::workbook::parser::GRID_SIZE;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub row: Option<i32>,
    pub col: Option<i32>,
}

fn default_grid_size() -> i32 {
    GRID_SIZE
}

#[derive(Debug, Deserialize)]
pub struct SaveParcelRequest {
    #[serde(flatten)]
    pub key: ParcelKey,
    pub corners: Vec<Corner>,
    #[serde(default = "default_grid_size")]
    pub rows: i32,
    #[serde(default = "default_grid_size")]
    pub cols: i32,
}

#[derive(Debug, Serialize)]
pub struct ColoredReport {
    #[serde(flatten)]
    pub report: tree_report::Model,
    pub color: [u8; 4],
}

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub range: RegimeRange,
    pub reports: Vec<ColoredReport>,
}

async fn caller_from(state: &AppState, headers: &HeaderMap) -> Result<Caller, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Ok(authenticate(&state.db, header).await?)
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

fn parcel_key(block: i32, sector: i32, parcel: i32) -> Result<ParcelKey, ApiError> {
    let key = ParcelKey::new(block, sector, parcel);
    if !key.is_valid() {
        return Err(ApiError::BadRequest(format!(
            "block, sector and parcel numbers must be positive ({key})"
        )));
    }
    Ok(key)
}

/// 解析上传的工作簿原始字节，只返回记录不写库
pub async fn parse_workbook_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    caller_from(&state, &headers).await?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty workbook".to_string()));
    }
    let records = parse_workbook_bytes(body.to_vec())?;
    Ok(Json(records).into_response())
}

/// 导入入口：`?action=delete`、`?action=clear-all`，其余都按分块导入处理
pub async fn process_excel(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let caller = caller_from(&state, &headers).await?;
    caller.require_admin()?;

    match query.action.as_deref() {
        Some("delete") => {
            let request: DeleteRequest = parse_body(&body)?;
            let resp = state.imports.delete_upload(&caller, request).await?;
            Ok(Json(resp).into_response())
        }
        Some("clear-all") => {
            let resp = state.imports.clear_all(&caller).await?;
            Ok(Json(resp).into_response())
        }
        _ => {
            let request: ChunkRequest = parse_body(&body)?;
            let resp = state.imports.process_chunk(&caller, request).await?;
            Ok(Json(resp).into_response())
        }
    }
}

pub async fn list_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    caller_from(&state, &headers).await?;
    let uploads = state.imports.list_uploads().await?;
    Ok(Json(uploads).into_response())
}

pub async fn save_parcel(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let caller = caller_from(&state, &headers).await?;
    caller.require_admin()?;
    let request: SaveParcelRequest = parse_body(&body)?;
    let points = interpolate_slice(&request.corners, request.rows, request.cols)?;
    let saved = state.parcels.save_grid(request.key, &points).await?;
    Ok((StatusCode::CREATED, Json(saved)).into_response())
}

pub async fn load_trees(
    State(state): State<AppState>,
    Path((block, sector, parcel)): Path<(i32, i32, i32)>,
    Query(query): Query<TreeQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    caller_from(&state, &headers).await?;
    let key = parcel_key(block, sector, parcel)?;
    let only = match (query.row, query.col) {
        (Some(row), Some(col)) => Some(TreeAddress::new(row, col)),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "row and col must be given together".to_string(),
            ))
        }
    };
    let trees = state.parcels.load_trees(key, only).await?;
    Ok(Json(trees).into_response())
}

pub async fn export_trees(
    State(state): State<AppState>,
    Path((block, sector, parcel)): Path<(i32, i32, i32)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    caller_from(&state, &headers).await?;
    let key = parcel_key(block, sector, parcel)?;
    let trees = state.parcels.load_trees(key, None).await?;
    let csv = trees_to_csv(&trees)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(Utc::now().date_naive())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

/// 树位置 (row, col) 为 0 起始，对应报表的 (row+1, col+1)
pub async fn tree_report(
    State(state): State<AppState>,
    Path((block, sector, parcel, row, col)): Path<(i32, i32, i32, i32, i32)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    caller_from(&state, &headers).await?;
    let key = parcel_key(block, sector, parcel)?;
    let report = state
        .parcels
        .report_for_tree(key, TreeAddress::new(row, col))
        .await?;
    Ok(Json(report).into_response())
}

/// 全部报表行，附带按 24/25 季果串数计算的颜色
pub async fn all_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    caller_from(&state, &headers).await?;
    let reports = state.parcels.all_reports(REPORT_PAGE_SIZE).await?;
    let range = RegimeRange::from_values(reports.iter().map(|r| r.nombre_de_regimes_24_25));
    let reports = reports
        .into_iter()
        .map(|report| ColoredReport {
            color: tree_color(report.nombre_de_regimes_24_25, range),
            report,
        })
        .collect();
    Ok(Json(ReportsResponse { range, reports }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportSettings;
    use crate::storage::repository::AccessRepository;
    use crate::storage::{establish_connection, StorageConfig};
    use axum::http::HeaderValue;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Fixture {
        state: AppState,
        admin: HeaderMap,
        viewer: HeaderMap,
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(
            establish_connection(&StorageConfig::in_memory())
                .await
                .unwrap(),
        );
        let admin = AccessRepository::issue_token(&db, "admin", None).await.unwrap();
        AccessRepository::grant_role(&db, "admin", "admin").await.unwrap();
        let viewer = AccessRepository::issue_token(&db, "viewer", None).await.unwrap();
        Fixture {
            state: AppState::new(db, ImportSettings::default()),
            admin: bearer(&admin),
            viewer: bearer(&viewer),
        }
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn square(rows: i32, cols: i32) -> Bytes {
        Bytes::from(
            json!({
                "blockNumber": 1, "sectorNumber": 1, "parcelNumber": 1,
                "corners": [
                    {"lat": 0.0, "lng": 0.0}, {"lat": 0.0, "lng": 1.0},
                    {"lat": 1.0, "lng": 1.0}, {"lat": 1.0, "lng": 0.0}
                ],
                "rows": rows, "cols": cols
            })
            .to_string(),
        )
    }

    fn action(name: Option<&str>) -> Query<ActionQuery> {
        Query(ActionQuery {
            action: name.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_import_requires_credentials() {
        let fx = fixture().await;
        let body = Bytes::from(json!({ "records": [] }).to_string());

        let err = process_excel(State(fx.state.clone()), action(None), HeaderMap::new(), body.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Unauthorized: Missing authorization header");

        let err = process_excel(State(fx.state.clone()), action(None), fx.viewer.clone(), body.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let resp = process_excel(State(fx.state.clone()), action(None), fx.viewer, body)
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let v = body_json(resp).await;
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "Forbidden: Admin access required");
    }

    #[tokio::test]
    async fn test_save_import_and_color_flow() {
        let fx = fixture().await;

        let resp = save_parcel(State(fx.state.clone()), fx.admin.clone(), square(3, 3))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let saved = body_json(resp).await;
        assert_eq!(saved["treeCount"], 9);
        assert_eq!(saved["blockNumber"], 1);

        let err = save_parcel(State(fx.state.clone()), fx.admin.clone(), square(3, 3))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let chunk = json!({
            "records": [
                {"bloc": 1, "sector": 1, "parcel": 1, "row": 1, "col": 1, "nombre_de_regimes_24_25": 2},
                {"bloc": 1, "sector": 1, "parcel": 1, "row": 1, "col": 2, "nombre_de_regimes_24_25": 10},
                {"bloc": 1, "sector": 1, "parcel": 1, "row": 2, "col": 2}
            ],
            "filename": "farm.xlsx",
            "isLastChunk": true
        });
        let resp = process_excel(
            State(fx.state.clone()),
            action(None),
            fx.admin.clone(),
            Bytes::from(chunk.to_string()),
        )
        .await
        .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["success"], true);
        assert_eq!(v["totalProcessed"], 3);
        assert_eq!(v["message"], "Processed 3 records (chunk 1/1)");

        let v = body_json(all_reports(State(fx.state.clone()), fx.viewer.clone()).await.unwrap()).await;
        assert_eq!(v["range"]["minValue"], 2);
        assert_eq!(v["range"]["maxValue"], 10);
        let reports = v["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 3);
        let color_of = |row: i64, col: i64| {
            reports
                .iter()
                .find(|r| r["row"] == row && r["col"] == col)
                .map(|r| r["color"].clone())
                .unwrap()
        };
        assert_eq!(color_of(1, 1), json!([255, 0, 0, 255]));
        assert_eq!(color_of(1, 2), json!([0, 255, 0, 255]));
        assert_eq!(color_of(2, 2), json!([200, 200, 200, 255]));

        // 树 (0,0) 对应报表 (1,1)
        let resp = tree_report(State(fx.state.clone()), Path((1, 1, 1, 0, 0)), fx.viewer.clone())
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["nombre_de_regimes_24_25"], 2);

        let uploads = body_json(list_uploads(State(fx.state.clone()), fx.viewer).await.unwrap()).await;
        assert_eq!(uploads.as_array().unwrap().len(), 1);
        assert_eq!(uploads[0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_delete_and_clear_actions() {
        let fx = fixture().await;

        let resp = process_excel(
            State(fx.state.clone()),
            action(Some("delete")),
            fx.admin.clone(),
            Bytes::from(json!({ "uploadId": "missing" }).to_string()),
        )
        .await
        .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["message"], "Upload deleted successfully");

        let err = process_excel(
            State(fx.state.clone()),
            action(Some("delete")),
            fx.admin.clone(),
            Bytes::from_static(b"not json"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let resp = process_excel(
            State(fx.state.clone()),
            action(Some("clear-all")),
            fx.admin,
            Bytes::new(),
        )
        .await
        .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["message"], "All data cleared successfully");
    }

    #[tokio::test]
    async fn test_parse_rejects_garbage_workbook() {
        let fx = fixture().await;
        let err = parse_workbook_upload(
            State(fx.state.clone()),
            fx.viewer.clone(),
            Bytes::from_static(b"definitely not a spreadsheet"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = parse_workbook_upload(State(fx.state.clone()), fx.viewer, Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_save_parcel_guards() {
        let fx = fixture().await;

        let err = save_parcel(State(fx.state.clone()), fx.viewer.clone(), square(2, 2))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(fx.state.parcels.load_trees(ParcelKey::new(1, 1, 1), None).await.is_err());

        let err = save_parcel(State(fx.state.clone()), fx.admin.clone(), square(i32::MAX, i32::MAX))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = save_parcel(State(fx.state.clone()), fx.admin, square(101, 100))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tree_report_rejects_out_of_range_address() {
        let fx = fixture().await;
        let err = tree_report(
            State(fx.state.clone()),
            Path((1, 1, 1, i32::MAX, 0)),
            fx.viewer.clone(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = tree_report(State(fx.state.clone()), Path((1, 1, 1, 0, -1)), fx.viewer)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trees_query_and_export() {
        let fx = fixture().await;
        save_parcel(State(fx.state.clone()), fx.admin.clone(), square(2, 2))
            .await
            .unwrap();

        let all = load_trees(
            State(fx.state.clone()),
            Path((1, 1, 1)),
            Query(TreeQuery { row: None, col: None }),
            fx.viewer.clone(),
        )
        .await
        .unwrap();
        assert_eq!(body_json(all).await.as_array().unwrap().len(), 4);

        let err = load_trees(
            State(fx.state.clone()),
            Path((1, 1, 1)),
            Query(TreeQuery { row: Some(1), col: None }),
            fx.viewer.clone(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = load_trees(
            State(fx.state.clone()),
            Path((7, 7, 7)),
            Query(TreeQuery { row: None, col: None }),
            fx.viewer.clone(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let resp = export_trees(State(fx.state.clone()), Path((1, 1, 1)), fx.viewer)
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(csv.lines().count(), 5);
        assert!(csv.lines().nth(1).unwrap().starts_with("0,0,"));
    }
}
