use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An authenticated Tableau session.
///
/// Deliberately not `Clone`: a session is signed out exactly once, by value,
/// through [`super::TableauApi::sign_out`].
pub struct Session {
    token: String,
    site_id: String,
    user_id: String,
}

impl Session {
    pub fn new(token: impl Into<String>, site_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            site_id: site_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("site_id", &self.site_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// One entry of the site's workbook listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookSummary {
    pub id: String,
    pub name: String,
    pub project_name: Option<String>,
    pub owner_name: Option<String>,
}

/// Paper size for the server-side PDF export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PageType {
    A3,
    A4,
    A5,
    B5,
    Executive,
    Folio,
    Ledger,
    Legal,
    #[default]
    Letter,
    Note,
    Quarto,
    Tabloid,
}

impl PageType {
    pub const ALL: [PageType; 12] = [
        PageType::A3,
        PageType::A4,
        PageType::A5,
        PageType::B5,
        PageType::Executive,
        PageType::Folio,
        PageType::Ledger,
        PageType::Legal,
        PageType::Letter,
        PageType::Note,
        PageType::Quarto,
        PageType::Tabloid,
    ];

    /// Value of the `type` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::A3 => "A3",
            PageType::A4 => "A4",
            PageType::A5 => "A5",
            PageType::B5 => "B5",
            PageType::Executive => "Executive",
            PageType::Folio => "Folio",
            PageType::Ledger => "Ledger",
            PageType::Legal => "Legal",
            PageType::Letter => "Letter",
            PageType::Note => "Note",
            PageType::Quarto => "Quarto",
            PageType::Tabloid => "Tabloid",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PageType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = PageType::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown page type '{s}' (expected one of {})", names.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "Portrait",
            Orientation::Landscape => "Landscape",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(format!(
                "unknown orientation '{other}' (expected Portrait or Landscape)"
            )),
        }
    }
}

/// Knobs for `GET .../workbooks/{id}/pdf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfExportOptions {
    pub page_type: PageType,
    pub orientation: Orientation,
    /// Maximum age of cached data in minutes; `None` leaves it to the server.
    pub max_age_minutes: Option<u32>,
    /// Sent as `vf_<field>=<value>`.
    pub view_filters: BTreeMap<String, String>,
    /// The download is aborted once the body grows past this many bytes.
    pub max_bytes: u64,
}

impl Default for PdfExportOptions {
    fn default() -> Self {
        Self {
            page_type: PageType::Letter,
            orientation: Orientation::Landscape,
            max_age_minutes: Some(1),
            view_filters: BTreeMap::new(),
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

impl PdfExportOptions {
    /// Query string pairs in a stable order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("type".to_string(), self.page_type.as_str().to_string()),
            ("orientation".to_string(), self.orientation.as_str().to_string()),
        ];
        if let Some(age) = self.max_age_minutes {
            pairs.push(("maxAge".to_string(), age.to_string()));
        }
        for (field, value) in &self.view_filters {
            pairs.push((format!("vf_{field}"), value.clone()));
        }
        pairs
    }
}
