//! The 23 special wards of Tokyo: area codes and name lookups shared by every adapter.

/// One of the 23 special wards, sorted by the published land-price ranking
/// used as the corpus's canonical ordering (most expensive first).
pub struct WardEntry {
    pub code: &'static str,
    pub name_ja: &'static str,
    pub romaji: &'static str,
}

pub const TOKYO_WARDS: &[WardEntry] = &[
    WardEntry { code: "13101", name_ja: "千代田区", romaji: "chiyoda" },
    WardEntry { code: "13103", name_ja: "港区", romaji: "minato" },
    WardEntry { code: "13102", name_ja: "中央区", romaji: "chuo" },
    WardEntry { code: "13113", name_ja: "渋谷区", romaji: "shibuya" },
    WardEntry { code: "13104", name_ja: "新宿区", romaji: "shinjuku" },
    WardEntry { code: "13105", name_ja: "文京区", romaji: "bunkyo" },
    WardEntry { code: "13110", name_ja: "目黒区", romaji: "meguro" },
    WardEntry { code: "13109", name_ja: "品川区", romaji: "shinagawa" },
    WardEntry { code: "13112", name_ja: "世田谷区", romaji: "setagaya" },
    WardEntry { code: "13116", name_ja: "豊島区", romaji: "toshima" },
    WardEntry { code: "13106", name_ja: "台東区", romaji: "taito" },
    WardEntry { code: "13114", name_ja: "中野区", romaji: "nakano" },
    WardEntry { code: "13115", name_ja: "杉並区", romaji: "suginami" },
    WardEntry { code: "13108", name_ja: "江東区", romaji: "koto" },
    WardEntry { code: "13111", name_ja: "大田区", romaji: "ota" },
    WardEntry { code: "13107", name_ja: "墨田区", romaji: "sumida" },
    WardEntry { code: "13117", name_ja: "北区", romaji: "kita" },
    WardEntry { code: "13118", name_ja: "荒川区", romaji: "arakawa" },
    WardEntry { code: "13119", name_ja: "板橋区", romaji: "itabashi" },
    WardEntry { code: "13120", name_ja: "練馬区", romaji: "nerima" },
    WardEntry { code: "13123", name_ja: "江戸川区", romaji: "edogawa" },
    WardEntry { code: "13122", name_ja: "葛飾区", romaji: "katsushika" },
    WardEntry { code: "13121", name_ja: "足立区", romaji: "adachi" },
];

/// Default ward used when a lookup has no match, mirroring the fallback the
/// scrapers used before this crate validated input at the command boundary.
const DEFAULT_CODE: &str = "13103";

/// Resolves an area code, Japanese ward name, or romaji name to its canonical
/// 5-digit code. Returns `None` instead of silently defaulting, since control
/// operations must reject an unknown area rather than run against 港区 by mistake.
pub fn resolve_code(input: &str) -> Option<&'static str> {
    if input.len() == 5 && input.chars().all(|c| c.is_ascii_digit()) {
        return TOKYO_WARDS.iter().find(|w| w.code == input).map(|w| w.code);
    }
    let lower = input.to_lowercase();
    TOKYO_WARDS
        .iter()
        .find(|w| w.name_ja == input || w.romaji == lower)
        .map(|w| w.code)
}

pub fn name_ja_for_code(code: &str) -> Option<&'static str> {
    TOKYO_WARDS.iter().find(|w| w.code == code).map(|w| w.name_ja)
}

pub fn romaji_for_code(code: &str) -> Option<&'static str> {
    TOKYO_WARDS.iter().find(|w| w.code == code).map(|w| w.romaji)
}

pub fn is_valid_code(code: &str) -> bool {
    TOKYO_WARDS.iter().any(|w| w.code == code)
}
