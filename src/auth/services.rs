use tracing::{info, warn};

use crate::auth::{jwt::JwtKeys, password::verify_password};
use crate::error::{AppError, AppResult};
use crate::users::{repo::UserRepository, repo_types::User};

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn issue_tokens(keys: &JwtKeys, user: &User) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: keys.sign_access(user.id, user.role)?,
        refresh_token: keys.sign_refresh(user.id, user.role)?,
    })
}

/// Checks credentials. Unknown email and wrong password look the same.
pub async fn authenticate(users: &dyn UserRepository, email: &str, password: &str) -> AppResult<User> {
    let email = email.trim().to_lowercase();
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let Some(user) = users.find_by_email(&email).await? else {
        warn!(email = %email, "login for unknown email");
        return Err(invalid());
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user)
}

pub async fn refresh(users: &dyn UserRepository, keys: &JwtKeys, refresh_token: &str) -> AppResult<(User, TokenPair)> {
    let claims = keys
        .verify_refresh(refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    let user = users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    if user.role != claims.role {
        warn!(user_id = %user.id, token_role = ?claims.role, role = ?user.role, "refresh with stale role");
        return Err(AppError::Unauthorized("Token no longer matches the account".into()));
    }
    let tokens = issue_tokens(keys, &user)?;
    Ok((user, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use crate::users::repo_types::UserRole;
    use axum::extract::FromRef;

    #[tokio::test]
    async fn authenticate_accepts_only_matching_password() {
        let h = Harness::new().await;
        h.users.seed_candidate("a@x.com").await;

        let user = authenticate(h.users.as_ref(), " A@x.com ", "password123").await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert!(matches!(
            authenticate(h.users.as_ref(), "a@x.com", "nope-nope").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(h.users.as_ref(), "b@x.com", "password123").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn refresh_issues_a_new_pair() {
        let h = Harness::new().await;
        let user = h.users.seed_company("c@x.com", true).await;
        let keys = JwtKeys::from_ref(&h.state);
        let pair = issue_tokens(&keys, &user).unwrap();

        let (again, tokens) = refresh(h.users.as_ref(), &keys, &pair.refresh_token).await.unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(keys.verify(&tokens.access_token).unwrap().sub, user.id);

        assert!(refresh(h.users.as_ref(), &keys, &pair.access_token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_refuses_a_token_for_another_role() {
        let h = Harness::new().await;
        let user = h.users.seed_candidate("a@x.com").await;
        let keys = JwtKeys::from_ref(&h.state);
        let token = keys.sign_refresh(user.id, UserRole::Admin).unwrap();

        assert!(matches!(
            refresh(h.users.as_ref(), &keys, &token).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
