//! Time zone and locale tables
//!
//! Country codes map to the zones and locales a resident browser would report.
//! Offsets use the JavaScript sign convention (minutes, positive west of UTC).

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use phf::phf_map;

/// Daylight saving rule applied to a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstRule {
    None,
    /// Second Sunday of March to first Sunday of November, 02:00 local
    NorthAmerica,
    /// Last Sunday of March to last Sunday of October, 01:00 UTC
    Europe,
    /// First Sunday of October to first Sunday of April, 02:00 local standard
    AustraliaSouth,
}

#[derive(Debug, Clone, Copy)]
pub struct ZoneInfo {
    pub country: &'static str,
    pub standard_offset: i32,
    pub rule: DstRule,
}

#[derive(Debug, Clone, Copy)]
pub struct CountryGeo {
    /// Zones weighted by population share inside the country
    pub zones: &'static [(&'static str, u32)],
    /// Locales, primary first
    pub locales: &'static [&'static str],
    /// Share of the default population when no proxy country is known
    pub weight: u32,
}

const fn zone(country: &'static str, standard_offset: i32, rule: DstRule) -> ZoneInfo {
    ZoneInfo {
        country,
        standard_offset,
        rule,
    }
}

pub static ZONES: phf::Map<&'static str, ZoneInfo> = phf_map! {
    "America/New_York" => zone("US", 300, DstRule::NorthAmerica),
    "America/Chicago" => zone("US", 360, DstRule::NorthAmerica),
    "America/Denver" => zone("US", 420, DstRule::NorthAmerica),
    "America/Phoenix" => zone("US", 420, DstRule::None),
    "America/Los_Angeles" => zone("US", 480, DstRule::NorthAmerica),
    "America/Toronto" => zone("CA", 300, DstRule::NorthAmerica),
    "America/Vancouver" => zone("CA", 480, DstRule::NorthAmerica),
    "America/Mexico_City" => zone("MX", 360, DstRule::None),
    "America/Sao_Paulo" => zone("BR", 180, DstRule::None),
    "Europe/London" => zone("GB", 0, DstRule::Europe),
    "Europe/Dublin" => zone("IE", 0, DstRule::Europe),
    "Europe/Berlin" => zone("DE", -60, DstRule::Europe),
    "Europe/Paris" => zone("FR", -60, DstRule::Europe),
    "Europe/Madrid" => zone("ES", -60, DstRule::Europe),
    "Europe/Rome" => zone("IT", -60, DstRule::Europe),
    "Europe/Amsterdam" => zone("NL", -60, DstRule::Europe),
    "Europe/Warsaw" => zone("PL", -60, DstRule::Europe),
    "Europe/Stockholm" => zone("SE", -60, DstRule::Europe),
    "Europe/Zurich" => zone("CH", -60, DstRule::Europe),
    "Europe/Vienna" => zone("AT", -60, DstRule::Europe),
    "Europe/Kyiv" => zone("UA", -120, DstRule::Europe),
    "Europe/Istanbul" => zone("TR", -180, DstRule::None),
    "Europe/Moscow" => zone("RU", -180, DstRule::None),
    "Asia/Tokyo" => zone("JP", -540, DstRule::None),
    "Asia/Seoul" => zone("KR", -540, DstRule::None),
    "Asia/Shanghai" => zone("CN", -480, DstRule::None),
    "Asia/Hong_Kong" => zone("HK", -480, DstRule::None),
    "Asia/Taipei" => zone("TW", -480, DstRule::None),
    "Asia/Singapore" => zone("SG", -480, DstRule::None),
    "Asia/Kolkata" => zone("IN", -330, DstRule::None),
    "Asia/Dubai" => zone("AE", -240, DstRule::None),
    "Australia/Sydney" => zone("AU", -600, DstRule::AustraliaSouth),
    "Australia/Melbourne" => zone("AU", -600, DstRule::AustraliaSouth),
    "Australia/Brisbane" => zone("AU", -600, DstRule::None),
    "Australia/Perth" => zone("AU", -480, DstRule::None),
};

pub static COUNTRIES: phf::Map<&'static str, CountryGeo> = phf_map! {
    "US" => CountryGeo {
        zones: &[
            ("America/New_York", 45),
            ("America/Chicago", 30),
            ("America/Denver", 6),
            ("America/Phoenix", 2),
            ("America/Los_Angeles", 17),
        ],
        locales: &["en-US", "es-US"],
        weight: 30,
    },
    "CA" => CountryGeo {
        zones: &[("America/Toronto", 70), ("America/Vancouver", 30)],
        locales: &["en-CA", "fr-CA"],
        weight: 4,
    },
    "MX" => CountryGeo { zones: &[("America/Mexico_City", 1)], locales: &["es-MX"], weight: 3 },
    "BR" => CountryGeo { zones: &[("America/Sao_Paulo", 1)], locales: &["pt-BR"], weight: 5 },
    "GB" => CountryGeo { zones: &[("Europe/London", 1)], locales: &["en-GB"], weight: 8 },
    "IE" => CountryGeo { zones: &[("Europe/Dublin", 1)], locales: &["en-IE"], weight: 1 },
    "DE" => CountryGeo { zones: &[("Europe/Berlin", 1)], locales: &["de-DE"], weight: 9 },
    "FR" => CountryGeo { zones: &[("Europe/Paris", 1)], locales: &["fr-FR"], weight: 7 },
    "ES" => CountryGeo { zones: &[("Europe/Madrid", 1)], locales: &["es-ES"], weight: 4 },
    "IT" => CountryGeo { zones: &[("Europe/Rome", 1)], locales: &["it-IT"], weight: 4 },
    "NL" => CountryGeo { zones: &[("Europe/Amsterdam", 1)], locales: &["nl-NL"], weight: 2 },
    "PL" => CountryGeo { zones: &[("Europe/Warsaw", 1)], locales: &["pl-PL"], weight: 3 },
    "SE" => CountryGeo { zones: &[("Europe/Stockholm", 1)], locales: &["sv-SE"], weight: 1 },
    "CH" => CountryGeo { zones: &[("Europe/Zurich", 1)], locales: &["de-CH", "fr-CH"], weight: 1 },
    "AT" => CountryGeo { zones: &[("Europe/Vienna", 1)], locales: &["de-AT"], weight: 1 },
    "UA" => CountryGeo { zones: &[("Europe/Kyiv", 1)], locales: &["uk-UA"], weight: 2 },
    "TR" => CountryGeo { zones: &[("Europe/Istanbul", 1)], locales: &["tr-TR"], weight: 3 },
    "RU" => CountryGeo { zones: &[("Europe/Moscow", 1)], locales: &["ru-RU"], weight: 4 },
    "JP" => CountryGeo { zones: &[("Asia/Tokyo", 1)], locales: &["ja-JP"], weight: 6 },
    "KR" => CountryGeo { zones: &[("Asia/Seoul", 1)], locales: &["ko-KR"], weight: 3 },
    "CN" => CountryGeo { zones: &[("Asia/Shanghai", 1)], locales: &["zh-CN"], weight: 4 },
    "HK" => CountryGeo { zones: &[("Asia/Hong_Kong", 1)], locales: &["zh-HK", "en-HK"], weight: 1 },
    "TW" => CountryGeo { zones: &[("Asia/Taipei", 1)], locales: &["zh-TW"], weight: 1 },
    "SG" => CountryGeo { zones: &[("Asia/Singapore", 1)], locales: &["en-SG", "zh-SG"], weight: 1 },
    "IN" => CountryGeo { zones: &[("Asia/Kolkata", 1)], locales: &["en-IN", "hi-IN"], weight: 6 },
    "AE" => CountryGeo { zones: &[("Asia/Dubai", 1)], locales: &["ar-AE", "en-AE"], weight: 1 },
    "AU" => CountryGeo {
        zones: &[
            ("Australia/Sydney", 45),
            ("Australia/Melbourne", 35),
            ("Australia/Brisbane", 15),
            ("Australia/Perth", 5),
        ],
        locales: &["en-AU"],
        weight: 3,
    },
};

/// Normalise a country code to ISO 3166 alpha-2 upper case
pub fn normalize_country(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Country owning a zone
pub fn zone_country(zone: &str) -> Option<&'static str> {
    ZONES.get(zone).map(|info| info.country)
}

/// Offset of `zone` at instant `at`, or `None` for an unknown zone
pub fn offset_at(zone: &str, at: DateTime<Utc>) -> Option<i32> {
    let info = ZONES.get(zone)?;
    let daylight = match info.rule {
        DstRule::None => false,
        DstRule::NorthAmerica => north_america_dst(at, info.standard_offset),
        DstRule::Europe => europe_dst(at),
        DstRule::AustraliaSouth => australia_south_dst(at, info.standard_offset),
    };
    Some(if daylight {
        info.standard_offset - 60
    } else {
        info.standard_offset
    })
}

/// Every offset the zone can report during a year
pub fn allowed_offsets(zone: &str) -> Option<Vec<i32>> {
    let info = ZONES.get(zone)?;
    Some(match info.rule {
        DstRule::None => vec![info.standard_offset],
        _ => vec![info.standard_offset, info.standard_offset - 60],
    })
}

/// Region subtag of a BCP 47 locale (`de-DE` -> `DE`)
pub fn locale_region(locale: &str) -> Option<String> {
    locale
        .split(['-', '_'])
        .nth(1)
        .filter(|region| region.len() == 2)
        .map(|region| region.to_ascii_uppercase())
}

/// Whether a resident of the zone's country plausibly uses `locale`
pub fn locale_fits_zone(locale: &str, zone: &str) -> Option<bool> {
    let country = zone_country(zone)?;
    if locale_region(locale).as_deref() == Some(country) {
        return Some(true);
    }
    Some(
        COUNTRIES
            .get(country)
            .map(|geo| geo.locales.iter().any(|known| *known == locale))
            .unwrap_or(false),
    )
}

/// `navigator.languages` for a primary locale
pub fn languages_for_locale(locale: &str) -> Vec<String> {
    let language = locale.split('-').next().unwrap_or(locale).to_string();
    let mut languages = vec![locale.to_string()];
    if language != locale {
        languages.push(language.clone());
    }
    if language != "en" {
        languages.push("en-US".to_string());
        languages.push("en".to_string());
    }
    languages
}

fn local_standard(at: DateTime<Utc>, standard_offset: i32) -> NaiveDateTime {
    at.naive_utc() - Duration::minutes(standard_offset as i64)
}

fn at_hour(date: Option<NaiveDate>, hour: u32) -> Option<NaiveDateTime> {
    date?.and_hms_opt(hour, 0, 0)
}

fn nth_sunday(year: i32, month: u32, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Sun, n)
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while day.weekday() != Weekday::Sun {
        day = day.pred_opt()?;
    }
    Some(day)
}

fn north_america_dst(at: DateTime<Utc>, standard_offset: i32) -> bool {
    let local = local_standard(at, standard_offset);
    let year = local.year();
    match (
        at_hour(nth_sunday(year, 3, 2), 2),
        at_hour(nth_sunday(year, 11, 1), 1),
    ) {
        (Some(start), Some(end)) => local >= start && local < end,
        _ => false,
    }
}

fn europe_dst(at: DateTime<Utc>) -> bool {
    let utc = at.naive_utc();
    let year = utc.year();
    match (
        at_hour(last_sunday(year, 3), 1),
        at_hour(last_sunday(year, 10), 1),
    ) {
        (Some(start), Some(end)) => utc >= start && utc < end,
        _ => false,
    }
}

fn australia_south_dst(at: DateTime<Utc>, standard_offset: i32) -> bool {
    let local = local_standard(at, standard_offset);
    let year = local.year();
    match (
        at_hour(nth_sunday(year, 4, 1), 2),
        at_hour(nth_sunday(year, 10, 1), 2),
    ) {
        (Some(end), Some(start)) => local < end || local >= start,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_fixed_zones() {
        assert_eq!(offset_at("Asia/Tokyo", utc(2026, 1, 10, 0)), Some(-540));
        assert_eq!(offset_at("Asia/Tokyo", utc(2026, 7, 10, 0)), Some(-540));
        assert_eq!(offset_at("Asia/Kolkata", utc(2026, 7, 10, 0)), Some(-330));
        assert_eq!(allowed_offsets("Asia/Tokyo"), Some(vec![-540]));
    }

    #[test]
    fn test_north_america_transitions() {
        assert_eq!(offset_at("America/New_York", utc(2026, 1, 15, 12)), Some(300));
        assert_eq!(offset_at("America/New_York", utc(2026, 7, 15, 12)), Some(240));
        // 2026-03-08 is the second Sunday of March
        assert_eq!(offset_at("America/New_York", utc(2026, 3, 8, 6)), Some(300));
        assert_eq!(offset_at("America/New_York", utc(2026, 3, 8, 8)), Some(240));
        assert_eq!(offset_at("America/Phoenix", utc(2026, 7, 15, 12)), Some(420));
    }

    #[test]
    fn test_europe_transitions() {
        // 2026-03-29 and 2026-10-25 are the last Sundays
        assert_eq!(offset_at("Europe/Berlin", utc(2026, 3, 29, 0)), Some(-60));
        assert_eq!(offset_at("Europe/Berlin", utc(2026, 3, 29, 2)), Some(-120));
        assert_eq!(offset_at("Europe/London", utc(2026, 10, 25, 0)), Some(-60));
        assert_eq!(offset_at("Europe/London", utc(2026, 10, 25, 2)), Some(0));
    }

    #[test]
    fn test_southern_hemisphere() {
        assert_eq!(offset_at("Australia/Sydney", utc(2026, 1, 15, 0)), Some(-660));
        assert_eq!(offset_at("Australia/Sydney", utc(2026, 7, 15, 0)), Some(-600));
        assert_eq!(offset_at("Australia/Brisbane", utc(2026, 1, 15, 0)), Some(-600));
    }

    #[test]
    fn test_unknown_zone() {
        assert_eq!(offset_at("Mars/Olympus_Mons", utc(2026, 1, 1, 0)), None);
        assert!(allowed_offsets("Mars/Olympus_Mons").is_none());
    }

    #[test]
    fn test_every_country_zone_is_known() {
        for (code, geo) in COUNTRIES.entries() {
            for (zone, _) in geo.zones {
                assert_eq!(zone_country(zone), Some(*code), "{} -> {}", code, zone);
            }
            for locale in geo.locales {
                assert_eq!(locale_fits_zone(locale, geo.zones[0].0), Some(true));
            }
        }
    }

    #[test]
    fn test_locale_compatibility() {
        assert_eq!(locale_fits_zone("de-DE", "Europe/Berlin"), Some(true));
        assert_eq!(locale_fits_zone("en-US", "Asia/Tokyo"), Some(false));
        assert_eq!(locale_fits_zone("es-US", "America/Chicago"), Some(true));
        assert_eq!(locale_fits_zone("en-US", "Nowhere/City"), None);
        assert_eq!(locale_region("zh-HK").as_deref(), Some("HK"));
        assert_eq!(locale_region("en"), None);
    }

    #[test]
    fn test_languages_for_locale() {
        assert_eq!(languages_for_locale("en-US"), vec!["en-US", "en"]);
        assert_eq!(languages_for_locale("de-DE"), vec!["de-DE", "de", "en-US", "en"]);
        assert_eq!(languages_for_locale("en-GB"), vec!["en-GB", "en"]);
    }
}
