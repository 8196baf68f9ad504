use reqwest::RequestBuilder;

/// Where a bearer credential travels on requests to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPlacement {
    /// `Authorization: Bearer <token>`
    Header,
    /// `?access_token=<token>`
    QueryParam,
}

/// A caller-supplied bearer token, forwarded verbatim to the stores.
///
/// The service never verifies it; the platform does.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    placement: CredentialPlacement,
}

impl Credential {
    pub fn new(token: impl Into<String>, placement: CredentialPlacement) -> Self {
        Self {
            token: token.into(),
            placement,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(token, CredentialPlacement::Header)
    }

    pub fn query_param(token: impl Into<String>) -> Self {
        Self::new(token, CredentialPlacement::QueryParam)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn placement(&self) -> CredentialPlacement {
        self.placement
    }

    /// Attach the token to an outgoing request.
    pub fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self.placement {
            CredentialPlacement::Header => req.bearer_auth(&self.token),
            CredentialPlacement::QueryParam => req.query(&[("access_token", self.token.as_str())]),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("placement", &self.placement)
            .finish()
    }
}

/// Attach an optional credential; anonymous reads go out bare.
pub(crate) fn apply_optional(req: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
    match credential {
        Some(c) => c.apply(req),
        None => req,
    }
}
