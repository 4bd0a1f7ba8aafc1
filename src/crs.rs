//! AOI geometry helpers.
//!
//! The driver never projects coordinates itself; the external tools do. What
//! it does need is to validate the two geometry values that come from the
//! configuration file and are forwarded verbatim to tools:
//!
//! - **AOI bounds**: `[min_x, min_y, max_x, max_y]` = `[west, south, east, north]`
//!   in the point cloud's projected CRS, written in the config as a
//!   space-separated list and passed to DSM generation as `--bounds`.
//! - **UTM zone**: a zone number with an optional hemisphere/latitude band
//!   letter (e.g. `17`, `17N`, `17R`), passed to the LAS conversion as
//!   `-utm` / `-target_utm`.

use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;

/// Bounds in the AOI's projected CRS: [min_x, min_y, max_x, max_y]
pub type Bounds = [f64; 4];

/// Parse a space-separated bounds list, e.g. `"435516 3354093 435873 3354360"`.
pub fn parse_bounds(text: &str) -> Result<Bounds> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("Invalid bounds value '{}'", token))
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.len() != 4 {
        anyhow::bail!(
            "Bounds must contain exactly 4 numbers (min_x min_y max_x max_y), got {}",
            values.len()
        );
    }
    if values.iter().any(|v| !v.is_finite()) {
        anyhow::bail!("Bounds must be finite numbers: '{}'", text);
    }

    Ok([values[0], values[1], values[2], values[3]])
}

/// Render bounds back into the argument form expected by the tools.
pub fn bounds_args(bounds: &Bounds) -> Vec<String> {
    bounds.iter().map(|v| v.to_string()).collect()
}

/// A UTM zone as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtmZone {
    /// Zone number, 1-60
    pub number: u8,

    /// Optional hemisphere (N/S) or latitude band letter (C-X)
    pub band: Option<char>,
}

impl FromStr for UtmZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        let rest = &s[digits.len()..];

        let number: u8 = digits
            .parse()
            .with_context(|| format!("Invalid UTM zone '{}': expected a zone number", s))?;
        if !(1..=60).contains(&number) {
            anyhow::bail!("Invalid UTM zone '{}': zone number must be 1-60", s);
        }

        let band = match rest.chars().collect::<Vec<_>>().as_slice() {
            [] => None,
            [c] if c.is_ascii_alphabetic() => {
                let c = c.to_ascii_uppercase();
                // I and O are not used as latitude bands
                if !('C'..='X').contains(&c) || c == 'I' || c == 'O' {
                    anyhow::bail!("Invalid UTM zone '{}': unknown band letter '{}'", s, c);
                }
                Some(c)
            }
            _ => anyhow::bail!("Invalid UTM zone '{}'", s),
        };

        Ok(Self { number, band })
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.band {
            Some(band) => write!(f, "{}{}", self.number, band),
            None => write!(f, "{}", self.number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounds() {
        let bounds = parse_bounds("435516 3354093.5 435873 3354360").unwrap();
        assert_eq!(bounds, [435516.0, 3354093.5, 435873.0, 3354360.0]);

        // Extra whitespace is tolerated
        let bounds = parse_bounds("  1 2\t3   4 ").unwrap();
        assert_eq!(bounds, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_parse_bounds_invalid() {
        assert!(parse_bounds("1 2 3").is_err());
        assert!(parse_bounds("1 2 3 4 5").is_err());
        assert!(parse_bounds("1 2 three 4").is_err());
        assert!(parse_bounds("1 2 inf 4").is_err());
        assert!(parse_bounds("").is_err());
    }

    #[test]
    fn test_bounds_args() {
        assert_eq!(
            bounds_args(&[1.0, 2.5, 3.0, 4.0]),
            vec!["1", "2.5", "3", "4"]
        );
    }

    #[test]
    fn test_utm_zone_parse() {
        let zone: UtmZone = "17N".parse().unwrap();
        assert_eq!(zone.number, 17);
        assert_eq!(zone.band, Some('N'));
        assert_eq!(zone.to_string(), "17N");

        let zone: UtmZone = "4".parse().unwrap();
        assert_eq!(zone.band, None);

        let zone: UtmZone = "17r".parse().unwrap();
        assert_eq!(zone.to_string(), "17R");
    }

    #[test]
    fn test_utm_zone_invalid() {
        assert!("0N".parse::<UtmZone>().is_err());
        assert!("61".parse::<UtmZone>().is_err());
        assert!("N".parse::<UtmZone>().is_err());
        assert!("17I".parse::<UtmZone>().is_err());
        assert!("17NN".parse::<UtmZone>().is_err());
        assert!("".parse::<UtmZone>().is_err());
    }
}
