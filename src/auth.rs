use crate::client::ApiClient;
use crate::error::ApiError;
use crate::request::ApiRequest;
use crate::types::{
    LoginPayload, OtpPayload, PasswordChange, PasswordResetPayload, ProfileUpdate, RegisterPayload,
    Registration, TokenPair, User,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const LOGIN_PATH: &str = "token/";
pub const PROFILE_PATH: &str = "utilisateurs/me/";
pub const REGISTER_PATH: &str = "register/";
pub const VERIFY_OTP_PATH: &str = "verify-otp/";
pub const RESEND_OTP_PATH: &str = "resend-otp/";
pub const RESET_PASSWORD_PATH: &str = "reset_password/";
pub const UPDATE_PROFILE_PATH: &str = "update-profile/";
pub const CHANGE_PASSWORD_PATH: &str = "change-password/";

impl ApiClient {
    /// Exchanges username/password for a token pair, stores it and returns the
    /// signed-in profile. Bad credentials come back as a plain 401
    /// [`ApiError::Status`]; they never trigger a refresh.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let pair: TokenPair = self
            .post_anonymous(LOGIN_PATH, &LoginPayload { username, password })
            .await?;

        self.credentials().store_pair(&pair.access, &pair.refresh)?;
        self.gate().forget_failure();
        tracing::info!(username, "signed in");
        self.session().logged_in();

        self.current_user().await
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.credentials().clear()?;
        tracing::info!("signed out");
        self.session().logged_out();
        Ok(())
    }

    /// Forces a refresh, joining one that is already in flight.
    pub async fn refresh_now(&self) -> Result<(), ApiError> {
        self.refresh_through_gate().await.map(|_| ())
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json(PROFILE_PATH).await
    }

    /// Profile for a stored session, refreshing the access token if needed.
    /// `None` when nothing is stored or the session could not be kept alive.
    pub async fn restore_session(&self) -> Result<Option<User>, ApiError> {
        if self.credentials().access_token()?.is_none() {
            return Ok(None);
        }
        match self.current_user().await {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.is_session_terminal() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_present()
    }

    /// Creates an inactive account; the returned id is verified with
    /// [`ApiClient::verify_otp`]. An existing inactive account comes back as an
    /// [`ApiError::Status`] whose [`ApiError::pending_user_id`] is set.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Registration, ApiError> {
        let registration: Registration = self
            .post_anonymous(REGISTER_PATH, &RegisterPayload { username, email, password })
            .await?;
        tracing::info!(user_id = %registration.user_id, "account registered");
        Ok(registration)
    }

    pub async fn verify_otp(&self, user_id: &str, code: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_anonymous(VERIFY_OTP_PATH, &OtpPayload { user_id, code: Some(code) })
            .await?;
        tracing::info!(user_id, "account verified");
        Ok(())
    }

    pub async fn resend_otp(&self, user_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_anonymous(RESEND_OTP_PATH, &OtpPayload { user_id, code: None })
            .await?;
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_anonymous(RESET_PASSWORD_PATH, &PasswordResetPayload { email })
            .await?;
        Ok(())
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.patch_json(UPDATE_PROFILE_PATH, update).await
    }

    pub async fn change_password(&self, change: &PasswordChange<'_>) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json(CHANGE_PASSWORD_PATH, change).await?;
        Ok(())
    }

    /// Deletes the signed-in account and forgets its credentials.
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.delete(PROFILE_PATH).await?;
        self.credentials().clear()?;
        tracing::info!("account deleted");
        self.session().logged_out();
        Ok(())
    }

    /// Public endpoints: no stored token, no refresh recovery.
    async fn post_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_anonymous(ApiRequest::post(path).json(body)?).await?;
        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }
}
