//! Caller identity taken from request headers.
//!
//! # Purpose
//! Collects the subject candidates a guarded request is evaluated for. Owner
//! headers are read before user headers, so an owner identity is tried first.
//!
//! # Security considerations
//! - Headers are trusted as-is. Deploy warden behind a proxy that
//!   authenticates callers and strips client-supplied identity headers.
use anyhow::{Context, Result};
use axum::http::{HeaderMap, HeaderName};

/// Which configured header set a subject came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Owner,
    User,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::Owner => "owner",
            IdentitySource::User => "user",
        }
    }
}

/// Authorized caller, inserted into request extensions by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub source: IdentitySource,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityHeaders {
    owner: Vec<HeaderName>,
    user: Vec<HeaderName>,
}

impl IdentityHeaders {
    pub fn new<O, U>(owner: O, user: U) -> Result<Self>
    where
        O: IntoIterator,
        O::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        Ok(Self {
            owner: parse_names(owner)?,
            user: parse_names(user)?,
        })
    }

    /// Subject candidates in evaluation order, without duplicates.
    ///
    /// Each header value may list several identities separated by commas.
    pub fn subjects(&self, headers: &HeaderMap) -> Vec<Principal> {
        let mut found: Vec<Principal> = Vec::new();
        let sets = [
            (IdentitySource::Owner, &self.owner),
            (IdentitySource::User, &self.user),
        ];
        for (source, names) in sets {
            for name in names {
                for value in headers.get_all(name) {
                    let Ok(value) = value.to_str() else {
                        tracing::debug!(header = %name, "ignoring non-ascii identity header");
                        continue;
                    };
                    for subject in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        if found.iter().any(|p| p.subject == subject) {
                            continue;
                        }
                        found.push(Principal {
                            subject: subject.to_string(),
                            source,
                        });
                    }
                }
            }
        }
        found
    }
}

fn parse_names<I>(names: I) -> Result<Vec<HeaderName>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| {
            let name = name.as_ref();
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid identity header name: {name}"))
        })
        .collect()
}
