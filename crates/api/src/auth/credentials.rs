//! Credential flows: OTP-gated signup, password login, provider login,
//! password reset, and the account operations that touch credentials.
//!
//! Every flow that ends in a signed-in user returns [`Authenticated`]; the
//! HTTP layer turns its tokens into cookies.

use std::sync::Arc;

use deepguard_core::error::CoreError;
use deepguard_core::otp::OtpPurpose;
use deepguard_core::types::{DbId, Timestamp};
use deepguard_core::users::{default_display_name, normalize_email};
use deepguard_db::models::user::{CreateUser, UpdateUser, User};
use deepguard_db::{StoreError, UserStore};

use crate::auth::identity::{IdentityError, IdentityVerifier};
use crate::auth::otp::OtpService;
use crate::auth::password::{
    hash_password, validate_password_strength, verify_password, MIN_PASSWORD_LENGTH,
};
use crate::auth::session::{IssuedTokens, RequestContext, SessionManager};
use crate::auth::{AuthError, CredentialError};
use crate::email::{Mailer, OutgoingEmail};

/// A user that has just signed in, with the tokens to deliver.
#[derive(Debug)]
pub struct Authenticated {
    pub user: User,
    pub tokens: IssuedTokens,
}

/// Signup form after transport decoding.
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub otp: String,
}

pub struct CredentialService {
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionManager>,
    otp: OtpService,
    mailer: Arc<dyn Mailer>,
    identity: Option<Arc<dyn IdentityVerifier>>,
}

impl CredentialService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<SessionManager>,
        otp: OtpService,
        mailer: Arc<dyn Mailer>,
        identity: Option<Arc<dyn IdentityVerifier>>,
    ) -> Self {
        Self {
            users,
            sessions,
            otp,
            mailer,
            identity,
        }
    }

    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    // -----------------------------------------------------------------------
    // Signup
    // -----------------------------------------------------------------------

    /// Email a signup code to an address that has no account yet.
    pub async fn send_signup_otp(
        &self,
        email: &str,
        name: Option<String>,
        now: Timestamp,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(CredentialError::UserExists.into());
        }

        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let code = self.otp.issue(OtpPurpose::Signup, &email, name, now).await?;
        self.deliver(
            OtpPurpose::Signup,
            &email,
            OutgoingEmail::signup_otp(&email, &code, self.otp.ttl()),
        )
        .await
    }

    /// Verify the signup code, create the account and sign it in.
    pub async fn signup(
        &self,
        input: SignupInput,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<Authenticated, AuthError> {
        let email = normalize_email(&input.email);
        validate_password_strength(&input.password, MIN_PASSWORD_LENGTH)
            .map_err(CredentialError::WeakPassword)?;

        let entry = self
            .otp
            .verify(OtpPurpose::Signup, &email, &input.otp, now)
            .await?;

        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(CredentialError::UserExists.into());
        }

        let name = input
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or(entry.display_name)
            .unwrap_or_else(|| default_display_name(&email));

        let user = self
            .users
            .insert_user(&CreateUser {
                email,
                name,
                password_hash: Some(hash_password(&input.password)?),
                ..Default::default()
            })
            .await
            .map_err(conflict_as_user_exists)?;

        tracing::info!(user_id = user.id, "User signed up");
        self.sign_in(user, ctx, now).await
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<Authenticated, AuthError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or(CredentialError::InvalidCredentials)?;

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(CredentialError::PasswordLoginDisabled.into());
        };
        if !verify_password(password, hash)? {
            tracing::info!(user_id = user.id, "Login failed: wrong password");
            return Err(CredentialError::InvalidCredentials.into());
        }

        self.sign_in(user, ctx, now).await
    }

    /// Sign in with an identity-provider token, creating or linking the
    /// account as needed.
    ///
    /// Lookup order: provider subject id, then verified email (the provider
    /// id is linked onto the existing account), then a new account.
    pub async fn provider_login(
        &self,
        token: &str,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<Authenticated, AuthError> {
        let verifier = self
            .identity
            .as_ref()
            .ok_or(CredentialError::ProviderLoginDisabled)?;

        let identity = verifier.verify(token).await.map_err(|e| match e {
            IdentityError::Invalid(reason) => {
                tracing::info!(%reason, "Identity token rejected");
                AuthError::from(CredentialError::InvalidIdentityToken)
            }
            IdentityError::Unavailable(reason) => AuthError::Internal(reason),
        })?;
        let email = normalize_email(&identity.email);

        let user = if let Some(user) = self
            .users
            .find_user_by_external_id(&identity.external_id)
            .await?
        {
            user
        } else if let Some(existing) = self.users.find_user_by_email(&email).await? {
            let avatar_url = match existing.avatar_url {
                Some(_) => None,
                None => identity.avatar_url.clone(),
            };
            let linked = self
                .users
                .update_user(
                    existing.id,
                    &UpdateUser {
                        google_id: Some(identity.external_id.clone()),
                        avatar_url,
                        ..Default::default()
                    },
                )
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "user",
                    id: existing.id,
                })?;
            tracing::info!(user_id = linked.id, "Linked identity provider to existing account");
            linked
        } else {
            let name = identity
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| default_display_name(&email));
            let user = self
                .users
                .insert_user(&CreateUser {
                    email,
                    name,
                    password_hash: None,
                    google_id: Some(identity.external_id.clone()),
                    avatar_url: identity.avatar_url.clone(),
                })
                .await
                .map_err(conflict_as_user_exists)?;
            tracing::info!(user_id = user.id, "User created from identity provider");
            user
        };

        self.sign_in(user, ctx, now).await
    }

    // -----------------------------------------------------------------------
    // Password reset
    // -----------------------------------------------------------------------

    pub async fn send_reset_otp(&self, email: &str, now: Timestamp) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if self.users.find_user_by_email(&email).await?.is_none() {
            return Err(CredentialError::EmailNotFound.into());
        }

        let code = self
            .otp
            .issue(OtpPurpose::PasswordReset, &email, None, now)
            .await?;
        self.deliver(
            OtpPurpose::PasswordReset,
            &email,
            OutgoingEmail::password_reset_otp(&email, &code, self.otp.ttl()),
        )
        .await
    }

    /// Verify the reset code, set the new password and revoke every session.
    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
        now: Timestamp,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        validate_password_strength(new_password, MIN_PASSWORD_LENGTH)
            .map_err(CredentialError::WeakPassword)?;

        self.otp
            .verify(OtpPurpose::PasswordReset, &email, otp, now)
            .await?;

        let user = self
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or(CredentialError::EmailNotFound)?;

        self.set_password_hash(user.id, new_password).await?;
        self.sessions.revoke_all(user.id).await?;

        tracing::info!(user_id = user.id, "Password reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    pub async fn change_password(
        &self,
        user_id: DbId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(CredentialError::PasswordLoginDisabled.into());
        };
        if !verify_password(current_password, hash)? {
            return Err(CredentialError::InvalidCredentials.into());
        }
        validate_password_strength(new_password, MIN_PASSWORD_LENGTH)
            .map_err(CredentialError::WeakPassword)?;

        self.set_password_hash(user_id, new_password).await?;
        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Update display name and/or avatar. Blank values are ignored.
    pub async fn update_profile(
        &self,
        user_id: DbId,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<User, AuthError> {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let avatar_url = avatar_url
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        if name.is_none() && avatar_url.is_none() {
            return Err(CoreError::Validation("Nothing to update".into()).into());
        }

        let user = self
            .users
            .update_user(
                user_id,
                &UpdateUser {
                    name,
                    avatar_url,
                    ..Default::default()
                },
            )
            .await?
            .ok_or(CoreError::NotFound {
                entity: "user",
                id: user_id,
            })?;
        Ok(user)
    }

    /// Delete the account; its sessions go with it.
    pub async fn delete_account(&self, user_id: DbId) -> Result<(), AuthError> {
        if !self.users.delete_user(user_id).await? {
            return Err(CoreError::NotFound {
                entity: "user",
                id: user_id,
            }
            .into());
        }
        tracing::info!(user_id, "Account deleted");
        Ok(())
    }

    pub async fn require_user(&self, user_id: DbId) -> Result<User, AuthError> {
        Ok(self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "user",
                id: user_id,
            })?)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn sign_in(
        &self,
        user: User,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<Authenticated, AuthError> {
        let tokens = self.sessions.issue_for(&user, ctx, now).await?;
        tracing::info!(user_id = user.id, "User signed in");
        Ok(Authenticated { user, tokens })
    }

    async fn set_password_hash(&self, user_id: DbId, password: &str) -> Result<(), AuthError> {
        self.users
            .update_user(
                user_id,
                &UpdateUser {
                    password_hash: Some(hash_password(password)?),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(CoreError::NotFound {
                entity: "user",
                id: user_id,
            })?;
        Ok(())
    }

    async fn deliver(
        &self,
        purpose: OtpPurpose,
        email: &str,
        message: OutgoingEmail,
    ) -> Result<(), AuthError> {
        if let Err(e) = self.mailer.send(message).await {
            tracing::error!(purpose = purpose.as_str(), error = %e, "OTP email delivery failed");
            self.otp.discard(purpose, email).await?;
            return Err(CredentialError::EmailDeliveryFailed.into());
        }
        Ok(())
    }
}

fn conflict_as_user_exists(err: StoreError) -> AuthError {
    match err {
        StoreError::Conflict(_) => CredentialError::UserExists.into(),
        other => other.into(),
    }
}
