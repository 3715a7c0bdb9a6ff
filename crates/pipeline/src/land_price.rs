//! Public land-price reference table preparation
//!
//! Brings the survey table into transaction units and vocabulary: station
//! distance in walking minutes, clipped lot geometry, the latest price rescaled
//! to the transaction price unit, the mean of the recent annual prices, and
//! expanded zoning names.

use tracing::{info, instrument};

use crate::config::LandPriceConfig;
use crate::errors::{PipelineError, Result};
use crate::frame::{Column, Frame};

/// Derives reference columns used by the key-fallback join
#[derive(Debug, Clone)]
pub struct LandPricePreparer {
    config: LandPriceConfig,
}

impl LandPricePreparer {
    pub fn new(config: LandPriceConfig) -> Self {
        Self { config }
    }

    /// Apply the reference-table renames, then derive every configured column.
    #[instrument(skip(self, frame), fields(rows = frame.height()))]
    pub fn prepare(&self, frame: Frame) -> Result<Frame> {
        let cfg = &self.config;
        let frame = frame.rename(&cfg.renames)?;

        let minutes = map_numeric(&frame.numeric(&cfg.station_distance)?, |d| {
            (d / cfg.minutes_divisor).floor().min(cfg.minutes_cap)
        });
        let frontage_ratio = map_numeric(&frame.numeric(&cfg.frontage_ratio)?, |r| {
            r.clamp(cfg.ratio_min, cfg.ratio_max)
        });
        let depth_ratio = map_numeric(&frame.numeric(&cfg.depth_ratio)?, |r| {
            r.clamp(cfg.ratio_min, cfg.ratio_max)
        });

        // Frontage uses the unclipped area, as surveyed.
        let frontage: Vec<Option<f64>> = frame
            .numeric(&cfg.area)?
            .iter()
            .zip(frontage_ratio.iter().zip(&depth_ratio))
            .map(|(area, (fr, dr))| match (area, fr, dr) {
                (Some(a), Some(f), Some(d)) => Some((a / f / d).sqrt() * f),
                _ => None,
            })
            .collect();
        let area = map_numeric(&frame.numeric(&cfg.area)?, |a| a.clamp(0.0, cfg.area_max));

        let price = map_numeric(&frame.numeric(&cfg.latest_price)?, |p| p / cfg.price_divisor);
        let recent_mean = self.recent_price_mean(&frame)?;
        let survey_year = vec![Some(cfg.survey_year); frame.height()];
        let zoning = self.expand_zoning(&frame)?;

        let frame = frame
            .with_column(&cfg.station_minutes, Column::Numeric(minutes))?
            .with_column(&cfg.frontage_ratio, Column::Numeric(frontage_ratio))?
            .with_column(&cfg.depth_ratio, Column::Numeric(depth_ratio))?
            .with_column(&cfg.frontage, Column::Numeric(frontage))?
            .with_column(&cfg.area, Column::Numeric(area))?
            .with_column(&cfg.price_column, Column::Numeric(price))?
            .with_column(&cfg.recent_mean_column, Column::Numeric(recent_mean))?
            .with_column(&cfg.survey_year_column, Column::Numeric(survey_year))?
            .with_column(&cfg.city_planning, zoning)?;

        info!(
            "Prepared {} land-price survey points ({} columns)",
            frame.height(),
            frame.width()
        );
        Ok(frame)
    }

    /// Row-wise mean of the recent annual prices, skipping nulls.
    fn recent_price_mean(&self, frame: &Frame) -> Result<Vec<Option<f64>>> {
        let series = self
            .config
            .recent_prices
            .iter()
            .map(|name| frame.numeric(name))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..frame.height())
            .map(|row| {
                let present: Vec<f64> = series.iter().filter_map(|s| s[row]).collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum::<f64>() / present.len() as f64)
                }
            })
            .collect())
    }

    /// Expand zoning abbreviations in order, substring by substring.
    fn expand_zoning(&self, frame: &Frame) -> Result<Column> {
        let column = &self.config.city_planning;
        let values = match frame.column(column)? {
            Column::Text(values) => values,
            Column::Numeric(_) => {
                return Err(PipelineError::missing(column, "must hold zoning labels"))
            }
        };

        Ok(Column::Text(
            values
                .iter()
                .map(|value| {
                    value.as_ref().map(|v| {
                        self.config
                            .zoning_abbreviations
                            .iter()
                            .fold(v.clone(), |acc, (short, long)| acc.replace(short, long))
                    })
                })
                .collect(),
        ))
    }
}

fn map_numeric(values: &[Option<f64>], f: impl Fn(f64) -> f64) -> Vec<Option<f64>> {
    values.iter().map(|v| v.map(&f)).collect()
}
