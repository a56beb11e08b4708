use crate::parcel::ParcelKey;
use regex::Regex;
use std::sync::OnceLock;

fn sheet_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"B(\d+)S(\d+)P(\d+)").expect("static sheet pattern"))
}

/// 解析工作表名 `B{bloc}S{sector}P{parcel}`；不匹配（或数字溢出）时返回 None
pub fn parse_sheet_name(name: &str) -> Option<ParcelKey> {
    let caps = sheet_name_pattern().captures(name)?;
    let block = caps[1].parse::<i32>().ok()?;
    let sector = caps[2].parse::<i32>().ok()?;
    let parcel = caps[3].parse::<i32>().ok()?;
    Some(ParcelKey::new(block, sector, parcel))
}
