use serde::Serialize;

use crate::types::Role;

/// API surface selected by the request's subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Portal {
    Main,
    Company,
    Admin,
}

impl Portal {
    /// Resolves the portal from a `Host` header value.
    ///
    /// Only the first DNS label is inspected, so `company.aqua.test:8080` and
    /// `company.localhost` both select the company portal.
    pub fn from_host(host: Option<&str>) -> Self {
        let Some(host) = host else {
            return Self::Main;
        };
        let host = host.trim();
        if host.starts_with('[') {
            return Self::Main;
        }
        let without_port = host.split(':').next().unwrap_or_default();
        let first_label = without_port.split('.').next().unwrap_or_default();

        match first_label.to_ascii_lowercase().as_str() {
            "company" => Self::Company,
            "admin" => Self::Admin,
            _ => Self::Main,
        }
    }

    /// Role whose accounts sign in through this portal.
    pub fn home_role(self) -> Role {
        match self {
            Self::Main => Role::Student,
            Self::Company => Role::Company,
            Self::Admin => Role::Admin,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Company => "company",
            Self::Admin => "admin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_subdomains() {
        assert_eq!(Portal::from_host(Some("company.aqua.test")), Portal::Company);
        assert_eq!(Portal::from_host(Some("ADMIN.aqua.test:8443")), Portal::Admin);
        assert_eq!(Portal::from_host(Some("aqua.test")), Portal::Main);
        assert_eq!(Portal::from_host(Some("www.aqua.test")), Portal::Main);
    }

    #[test]
    fn falls_back_to_main() {
        assert_eq!(Portal::from_host(None), Portal::Main);
        assert_eq!(Portal::from_host(Some("localhost:8080")), Portal::Main);
        assert_eq!(Portal::from_host(Some("127.0.0.1:8080")), Portal::Main);
        assert_eq!(Portal::from_host(Some("[::1]:8080")), Portal::Main);
        assert_eq!(Portal::from_host(Some("")), Portal::Main);
    }

    #[test]
    fn home_roles() {
        assert_eq!(Portal::Main.home_role(), Role::Student);
        assert_eq!(Portal::Company.home_role(), Role::Company);
        assert_eq!(Portal::Admin.home_role(), Role::Admin);
    }
}
