//! Coordinate reference identifiers
//!
//! The core never reprojects; a CRS is only compared so that inputs
//! expressed in different references are rejected instead of silently
//! mixed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation
    wkt: Option<String>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: None,
            proj: Some(proj.into()),
        }
    }

    /// Parse an `EPSG:<code>` authority string, falling back to PROJ or WKT
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if let Some(code) = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .and_then(|c| c.parse::<u32>().ok())
        {
            return Self::from_epsg(code);
        }
        if trimmed.starts_with('+') {
            return Self::from_proj(trimmed);
        }
        Self::from_wkt(trimmed)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Check if two CRS are equivalent
    ///
    /// Compares EPSG codes first, then normalized WKT, then normalized PROJ.
    /// Representations that cannot be compared are not equivalent.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return normalize(a) == normalize(b);
        }
        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return normalize(a) == normalize(b);
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase()
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Fail with [`Error::CrsMismatch`] when both references are known and differ.
///
/// A missing reference on either side is accepted: the caller is trusted to
/// have supplied coordinates in the grid's reference.
pub fn ensure_compatible(expected: Option<&CRS>, actual: Option<&CRS>) -> Result<()> {
    match (expected, actual) {
        (Some(a), Some(b)) if !a.is_equivalent(b) => {
            Err(Error::CrsMismatch(a.identifier(), b.identifier()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(2154);
        assert_eq!(crs.epsg(), Some(2154));
        assert_eq!(crs.identifier(), "EPSG:2154");
    }

    #[test]
    fn test_crs_parse() {
        assert_eq!(CRS::parse("EPSG:32632").epsg(), Some(32632));
        assert_eq!(CRS::parse("+proj=utm +zone=32").proj(), Some("+proj=utm +zone=32"));
        assert!(CRS::parse("PROJCS[\"x\"]").wkt().is_some());
    }

    #[test]
    fn test_crs_equivalence() {
        assert!(CRS::from_epsg(2154).is_equivalent(&CRS::parse("epsg:2154")));
        assert!(CRS::from_proj("+proj=utm  +zone=32").is_equivalent(&CRS::from_proj("+proj=utm +zone=32")));
        assert!(!CRS::from_epsg(2154).is_equivalent(&CRS::from_proj("+proj=utm")));
    }

    #[test]
    fn test_ensure_compatible() {
        let a = CRS::from_epsg(2154);
        let b = CRS::from_epsg(4326);
        assert!(ensure_compatible(Some(&a), None).is_ok());
        assert!(ensure_compatible(None, Some(&b)).is_ok());
        assert!(ensure_compatible(Some(&a), Some(&a.clone())).is_ok());
        assert!(matches!(
            ensure_compatible(Some(&a), Some(&b)),
            Err(Error::CrsMismatch(_, _))
        ));
    }
}
