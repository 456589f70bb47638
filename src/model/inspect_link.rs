//! Inspect links: the four-field locator of one inspectable item.
//!
//! A link is never rejected at construction time. Anything that does not
//! parse leaves the zero defaults in place, and callers check
//! [`InspectLink::is_valid`] before using it. Validity is a digit check
//! only, so callers that must tell "no match" apart use
//! [`InspectLink::try_parse`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const PREVIEW_BASE: &str = "steam://rungame/730/76561202255233023/+csgo_econ_action_preview";

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^steam://rungame/730/\d+/[+ ]csgo_econ_action_preview ([SM])(\d+)A(\d+)D(\d+)$")
        .expect("inspect link pattern is a valid regex")
});

/// Structured form of an inspect link, as accepted from query strings and
/// request bodies. Every field is optional; missing ones keep the `"0"`
/// default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectFields {
    pub s: Option<String>,
    pub a: Option<String>,
    pub d: Option<String>,
    pub m: Option<String>,
}

/// The validated field view returned by [`InspectLink::params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectParams {
    pub s: String,
    pub a: String,
    pub d: String,
    pub m: String,
}

/// An inspect link. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InspectLink {
    s: String,
    a: String,
    d: String,
    m: String,
}

impl Default for InspectLink {
    fn default() -> Self {
        Self {
            s: "0".to_string(),
            a: "0".to_string(),
            d: "0".to_string(),
            m: "0".to_string(),
        }
    }
}

impl InspectLink {
    /// Parse a raw (possibly percent-escaped) link string.
    ///
    /// Malformed escapes and non-matching strings yield a zero-valued,
    /// invalid link.
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_default()
    }

    /// Like [`InspectLink::parse`], but `None` when `raw` is not an inspect
    /// link at all. The HTTP boundary uses this to tell a link that did not
    /// match from one that matched with zero-valued fields.
    pub fn try_parse(raw: &str) -> Option<Self> {
        let decoded = urlencoding::decode(raw).ok()?;
        let groups = LINK_PATTERN.captures(&decoded)?;

        let owner = groups[2].to_string();
        let (s, m) = if &groups[1] == "S" {
            (owner, "0".to_string())
        } else {
            ("0".to_string(), owner)
        };

        Some(Self {
            s,
            a: groups[3].to_string(),
            d: groups[4].to_string(),
            m,
        })
    }

    /// Build from a structured record. Only nonempty fields are taken.
    pub fn from_fields(fields: &InspectFields) -> Self {
        let mut link = Self::default();
        let pick = |value: &Option<String>, slot: &mut String| {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                *slot = v.to_string();
            }
        };
        pick(&fields.s, &mut link.s);
        pick(&fields.a, &mut link.a);
        pick(&fields.d, &mut link.d);
        pick(&fields.m, &mut link.m);
        link
    }

    /// Build from an `(s, a, d, m)` tuple, taken verbatim.
    pub fn from_parts(s: &str, a: &str, d: &str, m: &str) -> Self {
        Self {
            s: s.to_string(),
            a: a.to_string(),
            d: d.to_string(),
            m: m.to_string(),
        }
    }

    /// True when all four fields are nonempty runs of decimal digits.
    pub fn is_valid(&self) -> bool {
        [&self.s, &self.a, &self.d, &self.m]
            .into_iter()
            .all(|field| is_only_digits(field))
    }

    pub fn is_market_link(&self) -> bool {
        self.is_valid() && self.m != "0"
    }

    /// The asset id. Unique within one job.
    pub fn asset_id(&self) -> &str {
        &self.a
    }

    pub fn params(&self) -> Option<InspectParams> {
        self.is_valid().then(|| InspectParams {
            s: self.s.clone(),
            a: self.a.clone(),
            d: self.d.clone(),
            m: self.m.clone(),
        })
    }

    /// Canonical link string, `None` unless valid. Market links take the
    /// `M` form, everything else the `S` form.
    pub fn to_link(&self) -> Option<String> {
        if !self.is_valid() {
            return None;
        }

        if self.m != "0" {
            Some(format!("{PREVIEW_BASE} M{}A{}D{}", self.m, self.a, self.d))
        } else {
            Some(format!("{PREVIEW_BASE} S{}A{}D{}", self.s, self.a, self.d))
        }
    }
}

impl fmt::Display for InspectLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S: {} A: {} D: {} M: {}", self.s, self.a, self.d, self.m)
    }
}

/// True for a nonempty string of ASCII digits.
pub fn is_only_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
