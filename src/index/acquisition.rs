//! Parse the imagery vendor's filename convention.
//!
//! A matching filename embeds, in order: an optional `GRA_` auxiliary marker,
//! a 2-digit + 3-letter + 8-digit acquisition prefix, a modality token, a
//! trailing `<12 digits>_<2 digits>_P<3 digits>` segment token, and an
//! extension. For example:
//!
//! ```text
//! 12ABC34567890-P1BS-123456789012_01_P001.NTF      pan image
//! 12ABC34567890-M1BS-123456789012_01_P001.TAR      msi info
//! GRA_12ABC34567890-M1BS-123456789012_01_P001.RPC  msi rpc
//! ```

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

static RE_IMAGERY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<gra>GRA_)?.*(?P<prefix>[0-9]{2}[A-Z]{3}[0-9]{8})-(?P<modality>P1BS|M1BS|A1BS)-(?P<trail>[0-9]{12}_[0-9]{2}_P[0-9]{3}).*(?P<ext>\..+)$",
    )
    .expect("valid imagery name regex")
});

/// Identifies one physical capture event across modalities and roles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcquisitionKey {
    /// 13-character acquisition prefix, e.g. `12ABC34567890`
    pub prefix: String,

    /// Segment token, e.g. `123456789012_01_P001`
    pub trail: String,
}

impl AcquisitionKey {
    pub fn new(prefix: impl Into<String>, trail: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            trail: trail.into(),
        }
    }
}

impl fmt::Display for AcquisitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.trail)
    }
}

/// Imaging modality, from the vendor's product token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modality {
    /// `P1BS` panchromatic
    Pan,
    /// `M1BS` multispectral
    Msi,
    /// `A1BS` short-wave infrared
    Swir,
}

impl Modality {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "P1BS" => Some(Modality::Pan),
            "M1BS" => Some(Modality::Msi),
            "A1BS" => Some(Modality::Swir),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Pan => "pan",
            Modality::Msi => "msi",
            Modality::Swir => "swir",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a file contributes to its modality bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// `.NTF` image
    Image,
    /// `.TAR` metadata archive
    Info,
    /// `GRA_*.RPC` camera model
    Rpc,
}

/// A filename that matched the vendor convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageryName {
    pub key: AcquisitionKey,
    pub modality: Modality,

    /// None for extensions that carry no role (the file still registers
    /// its modality for the acquisition)
    pub role: Option<Role>,
}

impl ImageryName {
    /// Match a path's base filename (case-insensitively) against the
    /// convention. Returns None for unrelated files.
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_uppercase();
        let caps = RE_IMAGERY_NAME.captures(&name)?;

        let modality = Modality::from_token(&caps["modality"])?;
        let key = AcquisitionKey::new(&caps["prefix"], &caps["trail"]);

        let ext = &caps["ext"];
        let role = if caps.name("gra").is_some() && ext.ends_with(".RPC") {
            Some(Role::Rpc)
        } else if ext.ends_with(".NTF") {
            Some(Role::Image)
        } else if ext.ends_with(".TAR") {
            Some(Role::Info)
        } else {
            None
        };

        Some(Self {
            key,
            modality,
            role,
        })
    }
}
