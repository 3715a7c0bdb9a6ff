//! Municipality and address normalization
//!
//! Produces the district key shared by the transaction and reference tables.
//! The reference table spells municipalities and addresses differently from
//! the transaction table; the rules below bring both to the same vocabulary
//! before any join key is built.

use tracing::debug;

use crate::config::TextConfig;
use crate::errors::Result;
use crate::frame::{Column, Frame};

const REFERENCE_MUNICIPALITY_PREFIX: &str = "東京";
const ADDRESS_EDGE_CHARS: &str = "東京都";
const ADDRESS_NOISE: [&str; 2] = ["大字", "字"];
const BLOCK_NUMBER_DIGITS: [char; 9] = ['１', '２', '３', '４', '５', '６', '７', '８', '９'];

/// Cleans string columns of both tables and derives the district key
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    config: TextConfig,
}

impl TextNormalizer {
    pub fn new(config: TextConfig) -> Self {
        Self { config }
    }

    /// Normalize municipality names and derive the district key from the address.
    pub fn normalize_reference(&self, frame: Frame) -> Result<Frame> {
        let municipality: Vec<Option<String>> = frame
            .text(&self.config.municipality_name)?
            .iter()
            .map(|name| name.as_deref().map(normalize_reference_municipality))
            .collect();

        let detail: Vec<Option<String>> = frame
            .text(&self.config.address)?
            .iter()
            .map(|address| {
                address
                    .as_deref()
                    .map(|a| truncate_chars(&address_district(a), self.config.detail_length))
            })
            .collect();

        debug!(
            "Normalized {} reference rows into `{}`",
            frame.height(),
            self.config.district_detail
        );

        frame
            .with_column(&self.config.municipality_name, Column::Text(municipality))?
            .with_column(&self.config.district_detail, Column::Text(detail))
    }

    /// Derive the district key as municipality name followed by district name.
    ///
    /// The municipality name is used as recorded, county prefix and trailing
    /// `市`/`区`/`町`/`村` included, so it lines up with the address-derived
    /// reference key. A null in either part leaves the key null.
    pub fn normalize_transactions(&self, frame: Frame) -> Result<Frame> {
        let detail: Vec<Option<String>> = {
            let municipality = frame.text(&self.config.municipality_name)?;
            let district = frame.text(&self.config.district_name)?;
            municipality
                .iter()
                .zip(district)
                .map(|(m, d)| match (m, d) {
                    (Some(m), Some(d)) => {
                        Some(truncate_chars(&format!("{m}{d}"), self.config.detail_length))
                    }
                    _ => None,
                })
                .collect()
        };

        frame.with_column(&self.config.district_detail, Column::Text(detail))
    }
}

/// `東京府中` -> `府中`, and the small `ケ` variant becomes `ヶ`.
pub fn normalize_reference_municipality(name: &str) -> String {
    name.strip_prefix(REFERENCE_MUNICIPALITY_PREFIX)
        .unwrap_or(name)
        .replace('ケ', "ヶ")
}

/// Reduce a residential address to the part before the block number.
pub fn address_district(address: &str) -> String {
    let mut district = address
        .trim_matches(|c| ADDRESS_EDGE_CHARS.contains(c))
        .to_string();
    for noise in ADDRESS_NOISE {
        district = district.replace(noise, "");
    }

    let cut = district
        .find(|c| BLOCK_NUMBER_DIGITS.contains(&c))
        .unwrap_or(district.len());
    district[..cut].trim().to_string()
}

/// First `n` characters (not bytes) of `s`.
pub fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
