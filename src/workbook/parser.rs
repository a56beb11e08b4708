use crate::parcel::ParcelKey;
use crate::workbook::record::TreeRecord;
use crate::workbook::sheet::parse_sheet_name;
use crate::workbook::WorkbookError;
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader};
use log::info;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

/// 每个地块固定 20 x 20 棵树
pub const GRID_SIZE: i32 = 20;
/// 树数据之前的表头行数
pub const HEADER_ROWS: usize = 5;

const PLANTING_DATE_CELL: (usize, usize) = (0, 2);
const BLOCK_AREA_CELL: (usize, usize) = (1, 2);
const VARIETY_COL: usize = 2;
const FIRST_REGIME_COL: usize = 3;

/// 逻辑坐标 (i, j)（均为 1 起始）对应的物理行号
///
/// 固定版式：5 行表头之后每个逻辑行占 20 个物理行，必须与现有表格保持一致。
pub fn physical_row(i: i32, j: i32) -> usize {
    HEADER_ROWS + (GRID_SIZE * (i - 1) + j) as usize
}

/// 从磁盘读取工作簿；只接受 .xlsx / .xls
pub fn parse_workbook_path(path: &Path) -> Result<Vec<TreeRecord>, WorkbookError> {
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xls"))
        .unwrap_or(false);
    if !supported {
        return Err(WorkbookError::UnsupportedFileType(path.display().to_string()));
    }

    let mut workbook = open_workbook_auto(path)?;
    parse_workbook(&mut workbook)
}

pub fn parse_workbook_bytes(bytes: Vec<u8>) -> Result<Vec<TreeRecord>, WorkbookError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    parse_workbook(&mut workbook)
}

/// 逐个工作表解析；名称不符合 `B{n}S{n}P{n}` 的工作表直接跳过
pub fn parse_workbook<RS, R>(workbook: &mut R) -> Result<Vec<TreeRecord>, WorkbookError>
where
    RS: Read + Seek,
    R: Reader<RS>,
{
    let sheet_names = workbook.sheet_names();
    info!("工作簿共 {} 个工作表", sheet_names.len());
    parse_sheets(&sheet_names, |name| {
        workbook
            .worksheet_range(name)
            .map_err(|e| format!("{:?}", e))
    })
}

/// 按名称筛选工作表，只为符合命名的工作表调用 `load`
fn parse_sheets<F>(sheet_names: &[String], mut load: F) -> Result<Vec<TreeRecord>, WorkbookError>
where
    F: FnMut(&str) -> Result<Range<Data>, String>,
{
    let mut records = Vec::new();
    for sheet_name in sheet_names {
        let Some(key) = parse_sheet_name(sheet_name) else {
            info!("跳过工作表 {}：名称格式不符", sheet_name);
            continue;
        };

        let range = load(sheet_name).map_err(|message| WorkbookError::Sheet {
            sheet: sheet_name.clone(),
            message,
        })?;
        records.extend(parse_range(key, &range));
    }

    info!("共解析 {} 条树记录", records.len());
    Ok(records)
}

/// 解析单个工作表；空单元格也会产生记录，每个地块恰好 400 条
pub fn parse_range(key: ParcelKey, range: &Range<Data>) -> Vec<TreeRecord> {
    let planting_date = cell_text(cell(range, PLANTING_DATE_CELL.0, PLANTING_DATE_CELL.1));
    let block_area = cell_text(cell(range, BLOCK_AREA_CELL.0, BLOCK_AREA_CELL.1));
    info!(
        "{}: 种植日期={:?} 区块面积={:?}",
        key, planting_date, block_area
    );

    let mut records = Vec::with_capacity((GRID_SIZE * GRID_SIZE) as usize);
    for i in 1..=GRID_SIZE {
        for j in 1..=GRID_SIZE {
            let idx = physical_row(i, j);
            let regime = |offset: usize| parse_regime(cell(range, idx, FIRST_REGIME_COL + offset));

            records.push(TreeRecord {
                bloc: key.block,
                sector: key.sector,
                parcel: key.parcel,
                row: i,
                col: j,
                variete: cell_text(cell(range, idx, VARIETY_COL)),
                date_de_plantation: planting_date.clone(),
                superficie_du_bloc: block_area.clone(),
                nombre_de_regimes_21_22: regime(0),
                nombre_de_regimes_22_23: regime(1),
                nombre_de_regimes_23_24: regime(2),
                nombre_de_regimes_24_25: regime(3),
                nombre_de_regimes_25_26: regime(4),
            });
        }
    }
    records
}

fn cell(range: &Range<Data>, row: usize, col: usize) -> Option<&Data> {
    let row = u32::try_from(row).ok()?;
    let col = u32::try_from(col).ok()?;
    range.get_value((row, col))
}

/// 单元格转文本；缺失为空串，整数值的浮点数不带小数部分
fn cell_text(value: Option<&Data>) -> String {
    match value {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) | Some(Data::DateTimeIso(s)) | Some(Data::DurationIso(s)) => {
            s.clone()
        }
        Some(Data::Int(i)) => i.to_string(),
        Some(Data::Float(f)) => format_number(*f),
        Some(Data::DateTime(dt)) => format_number(dt.as_f64()),
        Some(Data::Bool(b)) => b.to_string(),
        Some(Data::Error(e)) => e.to_string(),
    }
}

fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// 解析果串数：数字取整，文本取开头的整数部分，其余为 None
fn parse_regime(value: Option<&Data>) -> Option<i32> {
    match value? {
        Data::Int(i) => i32::try_from(*i).ok(),
        Data::Float(f) => truncate(*f),
        Data::DateTime(dt) => truncate(dt.as_f64()),
        Data::String(s) => leading_int(s),
        _ => None,
    }
}

fn truncate(f: f64) -> Option<i32> {
    if !f.is_finite() {
        return None;
    }
    let t = f.trunc();
    if t < f64::from(i32::MIN) || t > f64::from(i32::MAX) {
        return None;
    }
    Some(t as i32)
}

fn leading_int(s: &str) -> Option<i32> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).ok()
}
