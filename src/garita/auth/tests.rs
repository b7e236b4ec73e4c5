use super::password::{PasswordHasher, Sha256PasswordHasher};
use super::stage::{IMAGE_CODE_PARAM, MOBILE_PARAM, PASSWORD_PARAM, SMS_CODE_PARAM, USERNAME_PARAM};
use super::*;
use anyhow::Result;
use axum::http::Method;
use base64ct::{Base64, Encoding};
use secrecy::SecretString;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

fn user(username: &str, password: &str, mobile: Option<&str>) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        mobile: mobile.map(str::to_string),
        password_hash: Sha256PasswordHasher.hash(username, password),
        authorities: BTreeSet::from(["user".to_string()]),
        locked: false,
    }
}

fn state(config: AuthConfig) -> Result<AuthState> {
    let users = InMemoryUserStore::from_records([
        user("mrbird", "123456", Some("17777777777")),
        user("scott", "tiger", None),
    ]);
    let clients = InMemoryClientStore::from_clients([
        RegisteredClient {
            client_id: "clientA".to_string(),
            client_secret: SecretString::from("secretA".to_string()),
            allowed_grant_types: BTreeSet::from(["password".to_string()]),
            scopes: BTreeSet::from(["all".to_string()]),
        },
        RegisteredClient {
            client_id: "clientB".to_string(),
            client_secret: SecretString::from("secretB".to_string()),
            allowed_grant_types: BTreeSet::new(),
            scopes: BTreeSet::new(),
        },
    ]);
    Ok(AuthState::new(
        config,
        Arc::new(users),
        Arc::new(clients),
        Arc::new(LogSmsSender),
    )?)
}

fn password_login(session: &str, username: &str, password: &str, image_code: &str) -> LoginRequest {
    LoginRequest::new(Method::POST, DEFAULT_LOGIN_PATH)
        .with_session_id(session)
        .with_param(USERNAME_PARAM, username)
        .with_param(PASSWORD_PARAM, password)
        .with_param(IMAGE_CODE_PARAM, image_code)
}

fn sms_login(mobile: &str, code: &str) -> LoginRequest {
    LoginRequest::new(Method::POST, DEFAULT_LOGIN_PATH)
        .with_param(MOBILE_PARAM, mobile)
        .with_param(SMS_CODE_PARAM, code)
}

#[tokio::test]
async fn image_code_login_succeeds_once_and_replay_is_missing() -> Result<()> {
    let state = state(AuthConfig::new())?;
    state
        .challenges()
        .insert_for_test("S1", CodeKind::Image, "4821")
        .await;

    let outcome = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", "4821"))
        .await?;
    assert_eq!(outcome.principal.username, "mrbird");
    assert!(outcome.token.is_none());

    let replay = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", "4821"))
        .await;
    assert_eq!(replay.err(), Some(AuthError::from(ChallengeError::Missing)));
    Ok(())
}

#[tokio::test]
async fn issued_image_code_is_accepted() -> Result<()> {
    let state = state(AuthConfig::new())?;
    let issued = state.challenges().issue_image_code("S1").await?;

    let outcome = state
        .gateway()
        .login(&password_login("S1", "scott", "tiger", issued.code.value()))
        .await?;
    assert_eq!(outcome.principal.username, "scott");
    Ok(())
}

#[tokio::test]
async fn wrong_password_still_consumes_the_image_code() -> Result<()> {
    let state = state(AuthConfig::new())?;
    state
        .challenges()
        .insert_for_test("S1", CodeKind::Image, "4821")
        .await;

    let failed = state
        .gateway()
        .login(&password_login("S1", "mrbird", "wrong", "4821"))
        .await;
    assert_eq!(failed.err(), Some(AuthError::BadCredentials));
    assert!(state.challenges().is_empty().await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_image_code_is_expired() -> Result<()> {
    let state = state(AuthConfig::new())?;
    state
        .challenges()
        .insert_for_test("S1", CodeKind::Image, "4821")
        .await;

    tokio::time::advance(Duration::from_secs(61)).await;
    let result = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", "4821"))
        .await;
    assert_eq!(result.err(), Some(AuthError::from(ChallengeError::Expired)));
    Ok(())
}

#[tokio::test]
async fn sms_login_for_unregistered_mobile_consumes_the_code() -> Result<()> {
    let state = state(AuthConfig::new())?;
    let code = state.challenges().issue_sms_code("10000000000").await;

    let result = state
        .gateway()
        .login(&sms_login("10000000000", code.value()))
        .await;
    assert_eq!(result.err(), Some(AuthError::UnknownAccount));

    let retry = state
        .gateway()
        .login(&sms_login("10000000000", code.value()))
        .await;
    assert_eq!(retry.err(), Some(AuthError::from(ChallengeError::Missing)));
    Ok(())
}

#[tokio::test]
async fn sms_login_resolves_the_mobile_owner() -> Result<()> {
    let state = state(AuthConfig::new())?;
    let code = state.challenges().issue_sms_code("17777777777").await;

    let outcome = state
        .gateway()
        .login(&sms_login("17777777777", code.value()))
        .await?;
    assert_eq!(outcome.principal.username, "mrbird");
    Ok(())
}

#[tokio::test]
async fn eviction_policy_invalidates_the_first_session() -> Result<()> {
    let state = state(AuthConfig::new().with_max_sessions_prevents_login(false))?;

    state.challenges().insert_for_test("A", CodeKind::Image, "1111").await;
    let first = state
        .gateway()
        .login(&password_login("A", "mrbird", "123456", "1111"))
        .await?;

    state.challenges().insert_for_test("B", CodeKind::Image, "2222").await;
    let second = state
        .gateway()
        .login(&password_login("B", "mrbird", "123456", "2222"))
        .await?;

    assert_eq!(state.sessions().len().await, 1);
    assert_eq!(
        state.sessions().touch(first.session.session_id()).await.err(),
        Some(AuthError::SessionInvalid(SessionEnd::Expired))
    );
    assert!(state
        .sessions()
        .touch(second.session.session_id())
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn prevents_login_policy_rejects_a_second_browser() -> Result<()> {
    let state = state(AuthConfig::new())?;

    state.challenges().insert_for_test("A", CodeKind::Image, "1111").await;
    let first = state
        .gateway()
        .login(&password_login("A", "mrbird", "123456", "1111"))
        .await?;

    state.challenges().insert_for_test("B", CodeKind::Image, "2222").await;
    let second = state
        .gateway()
        .login(&password_login("B", "mrbird", "123456", "2222"))
        .await;

    assert_eq!(second.err(), Some(AuthError::TooManySessions));
    assert!(state
        .sessions()
        .lookup(first.session.session_id())
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn same_browser_can_log_in_again() -> Result<()> {
    let state = state(AuthConfig::new())?;

    state.challenges().insert_for_test("A", CodeKind::Image, "1111").await;
    let first = state
        .gateway()
        .login(&password_login("A", "mrbird", "123456", "1111"))
        .await?;

    let current = first.session.session_id().to_string();
    state
        .challenges()
        .insert_for_test(&current, CodeKind::Image, "2222")
        .await;
    let second = state
        .gateway()
        .login(&password_login(&current, "mrbird", "123456", "2222"))
        .await?;

    assert_ne!(second.session.session_id(), current);
    assert_eq!(state.sessions().len().await, 1);
    Ok(())
}

#[tokio::test]
async fn client_credentials_mint_a_token() -> Result<()> {
    let state = state(AuthConfig::new())?;
    state.challenges().insert_for_test("S1", CodeKind::Image, "4821").await;

    let header = format!("Basic {}", Base64::encode_string(b"clientA:secretA"));
    let outcome = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", "4821").with_authorization(header))
        .await?;

    let token = outcome.token.ok_or_else(|| anyhow::anyhow!("missing token"))?;
    assert_eq!(token.user_name, "mrbird");
    assert_eq!(token.client_id, "clientA");
    assert_eq!(token.scope, "all");
    Ok(())
}

#[tokio::test]
async fn rejected_client_does_not_take_a_session() -> Result<()> {
    let state = state(AuthConfig::new())?;
    state.challenges().insert_for_test("S1", CodeKind::Image, "4821").await;

    let header = format!("Basic {}", Base64::encode_string(b"clientA:secretB"));
    let result = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", "4821").with_authorization(header))
        .await;

    assert_eq!(result.err(), Some(AuthError::InvalidClientSecret));
    assert!(state.sessions().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn required_client_credentials_must_be_present() -> Result<()> {
    let state = state(AuthConfig::new().with_required_client_credentials(true))?;
    state.challenges().insert_for_test("S1", CodeKind::Image, "4821").await;

    let result = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", "4821"))
        .await;
    assert_eq!(result.err(), Some(AuthError::MissingClientCredentials));
    Ok(())
}

#[tokio::test]
async fn requests_off_the_login_path_skip_the_stages() -> Result<()> {
    let state = state(AuthConfig::new().with_login_path("/signin".to_string()))?;

    // no image code was issued, the stage does not guard /login here
    let outcome = state
        .gateway()
        .login(&password_login("S1", "mrbird", "123456", ""))
        .await?;
    assert_eq!(outcome.principal.username, "mrbird");
    Ok(())
}

#[tokio::test]
async fn client_is_limited_to_its_grant_types() -> Result<()> {
    let state = state(AuthConfig::new())?;
    state
        .challenges()
        .insert_for_test("17777777777", CodeKind::Sms, "123456")
        .await;

    let header = format!("Basic {}", Base64::encode_string(b"clientA:secretA"));
    let result = state
        .gateway()
        .login(&sms_login("17777777777", "123456").with_authorization(header))
        .await;
    assert_eq!(
        result.err(),
        Some(AuthError::UnauthorizedGrant("sms".to_string()))
    );
    assert!(state.sessions().is_empty().await);

    state
        .challenges()
        .insert_for_test("17777777777", CodeKind::Sms, "654321")
        .await;
    let header = format!("Basic {}", Base64::encode_string(b"clientB:secretB"));
    let outcome = state
        .gateway()
        .login(&sms_login("17777777777", "654321").with_authorization(header))
        .await?;
    let token = outcome.token.ok_or_else(|| anyhow::anyhow!("missing token"))?;
    assert_eq!(token.client_id, "clientB");
    Ok(())
}
