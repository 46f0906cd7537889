//! Canonical hosting-provider identifiers for ASN organization names
//!
//! Registries list the same provider under many organization names
//! ("AMAZON-02", "Amazon Data Services NoVa", ...). The mapper folds them
//! into one short id per provider.

use serde::Serialize;

/// Known organization-name fragments and the hoster id they map to.
///
/// Matching is case-insensitive and the first fragment found wins, so more
/// specific fragments must come before fragments they contain.
pub const DEFAULT_HOSTER_TABLE: &[(&str, &str)] = &[
    ("cloudflarenet", "cloudflare"),
    ("amazon technologies", "amazon"),
    ("amazon data services", "amazon"),
    ("amazon.com, inc.", "amazon"),
    ("hetzner-", "hetzner"),
    ("ovh", "ovh"),
    ("google", "google"),
    ("digitalocean", "digitalocean"),
    ("sakura-", "sakura"),
    ("us-linode-", "linode"),
    ("linode-", "linode"),
    ("contabo", "contabo"),
    ("vultr holdings", "vultr"),
    ("netcup", "netcup"),
    ("centurylink communications", "centurylink"),
    ("comcast cable", "comcast"),
    ("dreamhost-", "dreamhost"),
    ("microsoft corporation", "microsoft"),
    ("gandi-", "gandi"),
    ("cstnet-", "cstnet"),
    ("vtcdigicom-", "vtcdigicom"),
    ("idcf", "idcfrontier"),
    ("octopuce-", "octopuce"),
    ("as12876", "scaleway"),
    ("facebook", "facebook"),
    ("twitter", "twitter"),
];

/// Result of mapping one organization name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HosterMatch {
    /// Matched a fragment of the table
    Known(String),
    /// No fragment matched; derived from the upper-case network handle
    Discovered(String),
    /// No fragment matched and no network handle was found
    Unmapped,
}

impl HosterMatch {
    /// The hoster id, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            HosterMatch::Known(id) | HosterMatch::Discovered(id) => Some(id.as_str()),
            HosterMatch::Unmapped => None,
        }
    }
}

/// Maps organization names to hoster ids using an ordered fragment table
#[derive(Debug, Clone)]
pub struct HosterMapper {
    table: Vec<(String, String)>,
}

impl HosterMapper {
    /// Build a mapper from `(fragment, hoster id)` pairs in priority order
    pub fn new<I, F, H>(table: I) -> Self
    where
        I: IntoIterator<Item = (F, H)>,
        F: AsRef<str>,
        H: Into<String>,
    {
        Self {
            table: table
                .into_iter()
                .map(|(fragment, id)| (fragment.as_ref().to_lowercase(), id.into()))
                .collect(),
        }
    }

    /// Map an organization name to a hoster id.
    ///
    /// Falls back to the first all-upper-case token (the network handle)
    /// when no fragment matches.
    pub fn map(&self, org_name: &str) -> HosterMatch {
        let lowered = org_name.to_lowercase();
        if let Some((_, id)) = self
            .table
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment.as_str()))
        {
            return HosterMatch::Known(id.clone());
        }

        org_name
            .split_whitespace()
            .find(|token| is_network_handle(token))
            .map_or(HosterMatch::Unmapped, |token| {
                HosterMatch::Discovered(token.to_lowercase())
            })
    }
}

impl Default for HosterMapper {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTER_TABLE.iter().copied())
    }
}

/// At least one upper-case letter and no lower-case letters
fn is_network_handle(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}
