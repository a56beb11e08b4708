use crate::parcel::PlacedTree;
use chrono::{NaiveDate, SecondsFormat};
use csv::{QuoteStyle, Terminator, WriterBuilder};

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("No palm trees to export")]
    NoData,
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// 导出为 `ID,Latitude,Longitude,Timestamp`
///
/// 不加引号，所以 ID 里的逗号原样输出（下游工具按 5 列读取）。末尾没有换行。
pub fn trees_to_csv(trees: &[PlacedTree]) -> Result<String, ExportError> {
    if trees.is_empty() {
        return Err(ExportError::NoData);
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(["ID", "Latitude", "Longitude", "Timestamp"])?;
    for tree in trees {
        writer.write_record([
            tree.address.to_string(),
            format!("{:.8}", tree.lat),
            format!("{:.8}", tree.lng),
            tree.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let mut out = String::from_utf8(bytes)?;
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("palm-trees-{}.csv", date.format("%Y-%m-%d"))
}
