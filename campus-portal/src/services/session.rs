use crate::envelope::ApiEnvelope;
use crate::error::PortalResult;
use crate::models::{CurrentUser, LoginRequest, LoginResponse};
use campus_portal_http::{
    AuthenticatedClient, ClientError, RequestDescriptor, RequestOptions, TokenPair,
};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Login, logout and the current user's profile.
#[derive(Debug, Clone)]
pub struct SessionService {
    client: AuthenticatedClient,
}

impl SessionService {
    /// Login endpoint.
    pub const LOGIN_PATH: &'static str = "/user/auth/login";
    /// Logout endpoint.
    pub const LOGOUT_PATH: &'static str = "/user/auth/logout";
    /// Profile endpoint.
    pub const ME_PATH: &'static str = "/user/me";

    /// Create a new service.
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Log in and store the issued credentials.
    ///
    /// Wrong credentials surface as the backend's status (usually 401); no
    /// refresh is attempted for this call.
    pub async fn login(&self, email: &str, password: &str) -> PortalResult<CurrentUser> {
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(ClientError::from)?;
        let descriptor = RequestDescriptor::new(Method::POST, Self::LOGIN_PATH)
            .with_body(body)
            .with_options(RequestOptions::new().public());

        let envelope: ApiEnvelope<LoginResponse> = self.client.execute_json(descriptor).await?;
        let login = envelope.into_result()?;

        self.client.start_session(TokenPair {
            access_token: login.access_token,
            refresh_token: login.refresh_token,
        });
        info!(user = %login.user.id, role = ?login.user.role, "Logged in");
        Ok(login.user)
    }

    /// Log out.
    ///
    /// The backend is told to revoke the refresh token on a best-effort
    /// basis; local credentials are cleared regardless.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.client.session().refresh_token() {
            let body = json!({ "refreshToken": refresh_token });
            if let Err(e) = self
                .client
                .post_json::<_, Value>(Self::LOGOUT_PATH, &body)
                .await
            {
                warn!(error = %e, "Logout request failed; clearing local session anyway");
            }
        }
        self.client.end_session();
    }

    /// Fetch the logged-in user.
    pub async fn me(&self) -> PortalResult<CurrentUser> {
        let envelope: ApiEnvelope<CurrentUser> = self.client.get_json(Self::ME_PATH).await?;
        envelope.into_result()
    }
}
