//! Tokyo municipality reference data.
//!
//! The metropolis is divided into 62 municipalities: 23 special wards,
//! 26 cities, and 13 towns and villages (five of them in the Tama region,
//! the rest on the Izu and Ogasawara islands). Every station and area belongs
//! to exactly one of them. This table is static and never computed.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

/// The administrative kind of a municipality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MunicipalityKind {
    /// One of the 23 special wards (区).
    SpecialWard,
    /// City (市).
    City,
    /// Town (町).
    Town,
    /// Village (村).
    Village,
}

/// One of the 62 Tokyo municipalities.
///
/// The string form (serde and [`std::str::FromStr`]) is the URL slug, e.g.
/// `"shinjuku"` or `"higashimurayama"`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Municipality {
    // ── Special wards ────────────────────────────────────
    Chiyoda,
    Chuo,
    Minato,
    Shinjuku,
    Bunkyo,
    Taito,
    Sumida,
    Koto,
    Shinagawa,
    Meguro,
    Ota,
    Setagaya,
    Shibuya,
    Nakano,
    Suginami,
    Toshima,
    Kita,
    Arakawa,
    Itabashi,
    Nerima,
    Adachi,
    Katsushika,
    Edogawa,

    // ── Cities ──────────────────────────────────────────
    Hachioji,
    Tachikawa,
    Musashino,
    Mitaka,
    Ome,
    Fuchu,
    Akishima,
    Chofu,
    Machida,
    Koganei,
    Kodaira,
    Hino,
    Higashimurayama,
    Kokubunji,
    Kunitachi,
    Fussa,
    Komae,
    Higashiyamato,
    Kiyose,
    Higashikurume,
    Musashimurayama,
    Tama,
    Inagi,
    Hamura,
    Akiruno,
    Nishitokyo,

    // ── Towns and villages ──────────────────────────────
    Mizuho,
    Hinode,
    Hinohara,
    Okutama,
    Oshima,
    Toshimamura,
    Niijima,
    Kozushima,
    Miyake,
    Mikurajima,
    Hachijo,
    Aogashima,
    Ogasawara,
}

impl Municipality {
    /// Five-digit JIS municipality code (e.g. `13104` for Shinjuku).
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Chiyoda => 13101,
            Self::Chuo => 13102,
            Self::Minato => 13103,
            Self::Shinjuku => 13104,
            Self::Bunkyo => 13105,
            Self::Taito => 13106,
            Self::Sumida => 13107,
            Self::Koto => 13108,
            Self::Shinagawa => 13109,
            Self::Meguro => 13110,
            Self::Ota => 13111,
            Self::Setagaya => 13112,
            Self::Shibuya => 13113,
            Self::Nakano => 13114,
            Self::Suginami => 13115,
            Self::Toshima => 13116,
            Self::Kita => 13117,
            Self::Arakawa => 13118,
            Self::Itabashi => 13119,
            Self::Nerima => 13120,
            Self::Adachi => 13121,
            Self::Katsushika => 13122,
            Self::Edogawa => 13123,
            Self::Hachioji => 13201,
            Self::Tachikawa => 13202,
            Self::Musashino => 13203,
            Self::Mitaka => 13204,
            Self::Ome => 13205,
            Self::Fuchu => 13206,
            Self::Akishima => 13207,
            Self::Chofu => 13208,
            Self::Machida => 13209,
            Self::Koganei => 13210,
            Self::Kodaira => 13211,
            Self::Hino => 13212,
            Self::Higashimurayama => 13213,
            Self::Kokubunji => 13214,
            Self::Kunitachi => 13215,
            Self::Fussa => 13218,
            Self::Komae => 13219,
            Self::Higashiyamato => 13220,
            Self::Kiyose => 13221,
            Self::Higashikurume => 13222,
            Self::Musashimurayama => 13223,
            Self::Tama => 13224,
            Self::Inagi => 13225,
            Self::Hamura => 13227,
            Self::Akiruno => 13228,
            Self::Nishitokyo => 13229,
            Self::Mizuho => 13303,
            Self::Hinode => 13305,
            Self::Hinohara => 13307,
            Self::Okutama => 13308,
            Self::Oshima => 13361,
            Self::Toshimamura => 13362,
            Self::Niijima => 13363,
            Self::Kozushima => 13364,
            Self::Miyake => 13381,
            Self::Mikurajima => 13382,
            Self::Hachijo => 13401,
            Self::Aogashima => 13402,
            Self::Ogasawara => 13421,
        }
    }

    /// Official Japanese name (e.g. `"新宿区"`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chiyoda => "千代田区",
            Self::Chuo => "中央区",
            Self::Minato => "港区",
            Self::Shinjuku => "新宿区",
            Self::Bunkyo => "文京区",
            Self::Taito => "台東区",
            Self::Sumida => "墨田区",
            Self::Koto => "江東区",
            Self::Shinagawa => "品川区",
            Self::Meguro => "目黒区",
            Self::Ota => "大田区",
            Self::Setagaya => "世田谷区",
            Self::Shibuya => "渋谷区",
            Self::Nakano => "中野区",
            Self::Suginami => "杉並区",
            Self::Toshima => "豊島区",
            Self::Kita => "北区",
            Self::Arakawa => "荒川区",
            Self::Itabashi => "板橋区",
            Self::Nerima => "練馬区",
            Self::Adachi => "足立区",
            Self::Katsushika => "葛飾区",
            Self::Edogawa => "江戸川区",
            Self::Hachioji => "八王子市",
            Self::Tachikawa => "立川市",
            Self::Musashino => "武蔵野市",
            Self::Mitaka => "三鷹市",
            Self::Ome => "青梅市",
            Self::Fuchu => "府中市",
            Self::Akishima => "昭島市",
            Self::Chofu => "調布市",
            Self::Machida => "町田市",
            Self::Koganei => "小金井市",
            Self::Kodaira => "小平市",
            Self::Hino => "日野市",
            Self::Higashimurayama => "東村山市",
            Self::Kokubunji => "国分寺市",
            Self::Kunitachi => "国立市",
            Self::Fussa => "福生市",
            Self::Komae => "狛江市",
            Self::Higashiyamato => "東大和市",
            Self::Kiyose => "清瀬市",
            Self::Higashikurume => "東久留米市",
            Self::Musashimurayama => "武蔵村山市",
            Self::Tama => "多摩市",
            Self::Inagi => "稲城市",
            Self::Hamura => "羽村市",
            Self::Akiruno => "あきる野市",
            Self::Nishitokyo => "西東京市",
            Self::Mizuho => "瑞穂町",
            Self::Hinode => "日の出町",
            Self::Hinohara => "檜原村",
            Self::Okutama => "奥多摩町",
            Self::Oshima => "大島町",
            Self::Toshimamura => "利島村",
            Self::Niijima => "新島村",
            Self::Kozushima => "神津島村",
            Self::Miyake => "三宅村",
            Self::Mikurajima => "御蔵島村",
            Self::Hachijo => "八丈町",
            Self::Aogashima => "青ヶ島村",
            Self::Ogasawara => "小笠原村",
        }
    }

    /// Administrative kind, derived from the JIS code range and name suffix.
    #[must_use]
    pub fn kind(self) -> MunicipalityKind {
        let code = self.code();
        if code < 13200 {
            MunicipalityKind::SpecialWard
        } else if code < 13300 {
            MunicipalityKind::City
        } else if self.name().ends_with('村') {
            MunicipalityKind::Village
        } else {
            MunicipalityKind::Town
        }
    }

    /// Whether the police publish crime counts below the municipality level
    /// (町丁目) for this municipality.
    ///
    /// The island municipalities only publish a single municipality-wide
    /// figure, so every station and area inside them shares that record.
    #[must_use]
    pub const fn publishes_area_data(self) -> bool {
        !matches!(
            self,
            Self::Oshima
                | Self::Toshimamura
                | Self::Niijima
                | Self::Kozushima
                | Self::Miyake
                | Self::Mikurajima
                | Self::Hachijo
                | Self::Aogashima
                | Self::Ogasawara
        )
    }

    /// URL slug, identical to the [`std::fmt::Display`] form.
    #[must_use]
    pub fn slug(self) -> &'static str {
        self.into()
    }

    /// Looks up a municipality by its five-digit JIS code.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.code() == code)
    }

    /// Looks up a municipality by its URL slug.
    #[must_use]
    pub fn from_slug(slug: &str) -> Option<Self> {
        slug.parse().ok()
    }

    /// Extracts the municipality an area name belongs to by matching the
    /// longest municipality name prefix.
    ///
    /// `"新宿区西新宿2丁目"` resolves to [`Municipality::Shinjuku`]. Longer names
    /// are tried first.
    #[must_use]
    pub fn from_area_name(area_name: &str) -> Option<Self> {
        let mut candidates: Vec<Self> = Self::all().to_vec();
        candidates.sort_by_key(|m| std::cmp::Reverse(m.name().chars().count()));
        candidates
            .into_iter()
            .find(|m| area_name.starts_with(m.name()))
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Chiyoda,
            Self::Chuo,
            Self::Minato,
            Self::Shinjuku,
            Self::Bunkyo,
            Self::Taito,
            Self::Sumida,
            Self::Koto,
            Self::Shinagawa,
            Self::Meguro,
            Self::Ota,
            Self::Setagaya,
            Self::Shibuya,
            Self::Nakano,
            Self::Suginami,
            Self::Toshima,
            Self::Kita,
            Self::Arakawa,
            Self::Itabashi,
            Self::Nerima,
            Self::Adachi,
            Self::Katsushika,
            Self::Edogawa,
            Self::Hachioji,
            Self::Tachikawa,
            Self::Musashino,
            Self::Mitaka,
            Self::Ome,
            Self::Fuchu,
            Self::Akishima,
            Self::Chofu,
            Self::Machida,
            Self::Koganei,
            Self::Kodaira,
            Self::Hino,
            Self::Higashimurayama,
            Self::Kokubunji,
            Self::Kunitachi,
            Self::Fussa,
            Self::Komae,
            Self::Higashiyamato,
            Self::Kiyose,
            Self::Higashikurume,
            Self::Musashimurayama,
            Self::Tama,
            Self::Inagi,
            Self::Hamura,
            Self::Akiruno,
            Self::Nishitokyo,
            Self::Mizuho,
            Self::Hinode,
            Self::Hinohara,
            Self::Okutama,
            Self::Oshima,
            Self::Toshimamura,
            Self::Niijima,
            Self::Kozushima,
            Self::Miyake,
            Self::Mikurajima,
            Self::Hachijo,
            Self::Aogashima,
            Self::Ogasawara,
        ]
    }
}
