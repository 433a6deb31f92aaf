//! End-to-end flow tests against the in-memory repository

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use kernel::id::UserId;
use tower::ServiceExt;

use crate::application::{
    AccessTokenBlacklist, AuthTokens, AuthenticateUseCase, CredentialIdentityStore, LoginInput,
    LoginOutcome, LoginUseCase, LogoutInput, LogoutUseCase, PruneExpiredUseCase, RefreshInput,
    RefreshTokenStore, RefreshUseCase, RegisterInput, RegisterUseCase, TotpSetupUseCase,
    TwoFactorChallengeStore, UpdateAuthPolicyUseCase, VerifyTwoFactorInput,
    VerifyTwoFactorUseCase,
};
use crate::domain::entity::client::OAuthClient;
use crate::domain::entity::user::{ADMIN_ROLE, User};
use crate::domain::repository::{ClientRegistry, CredentialRepository, RefreshTokenRepository};
use crate::domain::value_object::auth_policy::{AuthPolicy, PolicyViolation};
use crate::domain::value_object::totp_secret::TotpSecret;
use crate::infra::{InMemoryAuthRepository, JwtAccessTokenSigner};
use crate::presentation::router::auth_router_generic;
use crate::{AuthConfig, AuthError};

const CLIENT: &str = "web";
const PASSWORD: &str = "correct-horse-9";

type Repo = InMemoryAuthRepository;
type Identity = CredentialIdentityStore<Repo>;

struct Harness {
    repo: Arc<Repo>,
    identity: Arc<Identity>,
    signer: Arc<JwtAccessTokenSigner>,
    config: Arc<AuthConfig>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_client_properties(None).await
    }

    async fn with_client_properties(properties: Option<&str>) -> Self {
        let config = Arc::new(AuthConfig::with_random_secrets());
        let repo = Arc::new(InMemoryAuthRepository::new());
        repo.save_client(&OAuthClient::new(CLIENT, properties.map(str::to_string)))
            .await
            .unwrap();

        Self {
            identity: Arc::new(CredentialIdentityStore::new(repo.clone(), config.clone())),
            signer: Arc::new(JwtAccessTokenSigner::from_config(&config)),
            repo,
            config,
        }
    }

    async fn with_policy(policy: AuthPolicy) -> Self {
        let properties = policy.merge_into(None);
        Self::with_client_properties(Some(&properties)).await
    }

    async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        RegisterUseCase::new(self.repo.clone(), self.identity.clone(), self.config.clone())
            .execute(RegisterInput {
                email: email.to_string(),
                password: password.to_string(),
                client_id: CLIENT.to_string(),
            })
            .await
    }

    fn login_use_case(&self) -> LoginUseCase<Repo, Identity, JwtAccessTokenSigner> {
        LoginUseCase::new(
            self.repo.clone(),
            self.identity.clone(),
            self.signer.clone(),
            self.config.clone(),
        )
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        self.login_use_case()
            .execute(LoginInput {
                email: email.to_string(),
                password: password.to_string(),
                client_id: CLIENT.to_string(),
            })
            .await
    }

    async fn login_tokens(&self, email: &str) -> AuthTokens {
        match self.login(email, PASSWORD).await.unwrap() {
            LoginOutcome::Authenticated(tokens) => tokens,
            other => panic!("expected a session, got {other:?}"),
        }
    }

    async fn verify(&self, challenge_token: &str, code: &str) -> Result<AuthTokens, AuthError> {
        VerifyTwoFactorUseCase::new(
            self.repo.clone(),
            self.identity.clone(),
            self.signer.clone(),
            self.config.clone(),
        )
        .execute(VerifyTwoFactorInput {
            challenge_token: challenge_token.to_string(),
            code: code.to_string(),
            client_id: CLIENT.to_string(),
        })
        .await
    }

    fn refresh_use_case(&self) -> RefreshUseCase<Repo, Identity, JwtAccessTokenSigner> {
        RefreshUseCase::new(
            self.repo.clone(),
            self.identity.clone(),
            self.signer.clone(),
            self.config.clone(),
        )
    }

    async fn refresh(&self, access_token: &str, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        self.refresh_use_case()
            .execute(RefreshInput {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
            })
            .await
    }

    async fn authenticate(&self, access_token: &str) -> Result<(), AuthError> {
        AuthenticateUseCase::new(self.repo.clone(), self.signer.clone(), self.config.clone())
            .execute(access_token)
            .await
            .map(|_| ())
    }

    fn refresh_tokens(&self) -> RefreshTokenStore<Repo> {
        RefreshTokenStore::new(self.repo.clone(), self.config.clone())
    }

    /// Enrol and confirm TOTP, returning the secret
    async fn enable_totp(&self, user: &User) -> TotpSecret {
        let totp = TotpSetupUseCase::new(self.repo.clone(), self.config.clone());
        let setup = totp.setup(&user.user_id).await.unwrap();
        let secret = TotpSecret::from_base32(setup.secret).unwrap();
        totp.confirm(&user.user_id, &self.current_code(&secret, user))
            .await
            .unwrap();
        secret
    }

    fn current_code(&self, secret: &TotpSecret, user: &User) -> String {
        secret.generate_current(&self.config.totp_issuer, user.email.as_str())
    }
}

fn other_code(code: &str) -> String {
    if code == "000000" { "111111" } else { "000000" }.to_string()
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_without_mfa_issues_session() {
    let h = Harness::new().await;
    let user = h.register("alice@example.com", PASSWORD).await.unwrap();

    let tokens = h.login_tokens("Alice@Example.com").await;

    assert_eq!(tokens.user_id, user.user_id);
    h.authenticate(&tokens.access_token).await.unwrap();

    let debug = format!("{tokens:?}");
    assert!(!debug.contains(&tokens.refresh_token));
    assert!(!debug.contains(&tokens.access_token));

    // Only the keyed digest is stored
    let digest = h.refresh_tokens().digest(&tokens.refresh_token);
    let stored = h.repo.find_refresh_token(&digest).await.unwrap().unwrap();
    assert_eq!(stored.session_id, tokens.session_id);
    assert_ne!(stored.token_hash, tokens.refresh_token);
    assert!(
        h.repo
            .find_refresh_token(&tokens.refresh_token)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password_look_the_same() {
    let h = Harness::new().await;
    h.register("bob@example.com", PASSWORD).await.unwrap();

    let unknown = h.login("nobody@example.com", PASSWORD).await.unwrap_err();
    let wrong = h.login("bob@example.com", "wrong-password-1").await.unwrap_err();
    let malformed = h.login("not-an-email", PASSWORD).await.unwrap_err();

    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert!(matches!(malformed, AuthError::InvalidCredentials));
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn test_unknown_or_inactive_client() {
    let h = Harness::new().await;
    h.register("carol@example.com", PASSWORD).await.unwrap();

    let mut inactive = OAuthClient::new("retired", None);
    inactive.is_active = false;
    h.repo.save_client(&inactive).await.unwrap();

    for client_id in ["missing", "retired"] {
        let err = h
            .login_use_case()
            .execute(LoginInput {
                email: "carol@example.com".into(),
                password: PASSWORD.into(),
                client_id: client_id.into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ClientNotFound));
    }
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let h = Harness::new().await;
    let user = h.register("dave@example.com", PASSWORD).await.unwrap();
    let max = h.config.lockout.max_failed_attempts;

    for _ in 0..max {
        let err = h.login("dave@example.com", "wrong-password-1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    // Locked even with the right password
    let err = h.login("dave@example.com", PASSWORD).await.unwrap_err();
    match err {
        AuthError::AccountLocked { retry_after } => assert!(!retry_after.is_zero()),
        other => panic!("expected AccountLocked, got {other:?}"),
    }

    let credential = h.repo.find_credential(&user.user_id).await.unwrap().unwrap();
    assert!(credential.locked_until.is_some());
    assert_eq!(h.repo.refresh_token_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wrong_passwords_stop_at_threshold() {
    let h = Harness::new().await;
    let user = h.register("dana@example.com", PASSWORD).await.unwrap();
    let max = h.config.lockout.max_failed_attempts as usize;
    let use_case = Arc::new(h.login_use_case());

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let use_case = use_case.clone();
            let input = LoginInput {
                email: "dana@example.com".to_string(),
                password: format!("wrong-password-{i}"),
                client_id: CLIENT.to_string(),
            };
            tokio::spawn(async move { use_case.execute(input).await })
        })
        .collect();

    let mut evaluated = 0;
    let mut locked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Err(AuthError::InvalidCredentials) => evaluated += 1,
            Err(AuthError::AccountLocked { .. }) => locked += 1,
            other => panic!("unexpected login result: {other:?}"),
        }
    }
    assert_eq!(evaluated, max);
    assert_eq!(locked, 24 - max);

    let credential = h.repo.find_credential(&user.user_id).await.unwrap().unwrap();
    assert!(credential.locked_until.is_some());
}

#[tokio::test]
async fn test_correct_password_during_lockout_keeps_lock() {
    let h = Harness::new().await;
    let user = h.register("dylan@example.com", PASSWORD).await.unwrap();
    let max = h.config.lockout.max_failed_attempts;

    for _ in 0..max {
        h.login("dylan@example.com", "wrong-password-1").await.unwrap_err();
    }
    let locked_until = h
        .repo
        .find_credential(&user.user_id)
        .await
        .unwrap()
        .unwrap()
        .locked_until;

    let err = h.login("dylan@example.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));

    let credential = h.repo.find_credential(&user.user_id).await.unwrap().unwrap();
    assert_eq!(credential.locked_until, locked_until);
}

#[tokio::test]
async fn test_success_resets_failure_counter() {
    let h = Harness::new().await;
    let user = h.register("erin@example.com", PASSWORD).await.unwrap();

    for _ in 0..h.config.lockout.max_failed_attempts - 1 {
        h.login("erin@example.com", "wrong-password-1").await.unwrap_err();
    }
    h.login_tokens("erin@example.com").await;

    let credential = h.repo.find_credential(&user.user_id).await.unwrap().unwrap();
    assert_eq!(credential.failed_attempts, 0);

    // A fresh series is needed to lock again
    h.login("erin@example.com", "wrong-password-1").await.unwrap_err();
    h.login_tokens("erin@example.com").await;
}

#[tokio::test]
async fn test_email_verification_gate() {
    let h = Harness::with_policy(AuthPolicy {
        require_email_verification: true,
        ..AuthPolicy::default()
    })
    .await;
    let user = h.register("frank@example.com", PASSWORD).await.unwrap();

    let err = h.login("frank@example.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::EmailNotVerified));

    // Same answer for a wrong password, after the hash was checked
    let err = h.login("frank@example.com", "wrong-password-1").await.unwrap_err();
    assert!(matches!(err, AuthError::EmailNotVerified));
    let credential = h.repo.find_credential(&user.user_id).await.unwrap().unwrap();
    assert_eq!(credential.failed_attempts, 1);

    assert!(h.repo.mark_email_verified(&user.user_id));
    h.login_tokens("frank@example.com").await;
}

#[tokio::test]
async fn test_client_requiring_mfa_rejects_unenrolled_user() {
    let h = Harness::with_policy(AuthPolicy {
        require_mfa: true,
        ..AuthPolicy::default()
    })
    .await;
    h.register("grace@example.com", PASSWORD).await.unwrap();

    let err = h.login("grace@example.com", PASSWORD).await.unwrap_err();

    assert!(matches!(err, AuthError::TwoFactorRequired));
    assert_eq!(h.repo.refresh_token_count(), 0);
}

#[tokio::test]
async fn test_malformed_policy_blob_falls_back_to_default() {
    let h = Harness::with_client_properties(Some("{not json")).await;

    // Default policy: length 8, no character classes
    h.register("heidi@example.com", "abcdefgh").await.unwrap();
    let err = h.register("ivan@example.com", "abcdefg").await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::PolicyViolation(PolicyViolation::TooShort { min: 8 })
    ));
}

// ============================================================================
// Two-Factor
// ============================================================================

#[tokio::test]
async fn test_two_factor_login_flow() {
    let h = Harness::new().await;
    let user = h.register("judy@example.com", PASSWORD).await.unwrap();
    let secret = h.enable_totp(&user).await;

    let LoginOutcome::TwoFactorPending { challenge_token } =
        h.login("judy@example.com", PASSWORD).await.unwrap()
    else {
        panic!("expected a pending second factor");
    };
    assert_eq!(h.repo.refresh_token_count(), 0);

    let tokens = h
        .verify(&challenge_token, &h.current_code(&secret, &user))
        .await
        .unwrap();
    assert_eq!(tokens.user_id, user.user_id);
    h.authenticate(&tokens.access_token).await.unwrap();

    let debug = format!("{tokens:?}");
    assert!(!debug.contains(&tokens.refresh_token));
    assert!(!debug.contains(&tokens.access_token));
}

#[tokio::test]
async fn test_wrong_code_spends_the_challenge() {
    let h = Harness::new().await;
    let user = h.register("ken@example.com", PASSWORD).await.unwrap();
    let secret = h.enable_totp(&user).await;

    let LoginOutcome::TwoFactorPending { challenge_token } =
        h.login("ken@example.com", PASSWORD).await.unwrap()
    else {
        panic!("expected a pending second factor");
    };

    let code = h.current_code(&secret, &user);
    let err = h.verify(&challenge_token, &other_code(&code)).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidChallenge));

    let err = h.verify(&challenge_token, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidChallenge));
}

#[tokio::test]
async fn test_challenge_redeemed_twice_fails_second_time() {
    let h = Harness::new().await;
    let store = TwoFactorChallengeStore::new(h.repo.clone(), h.config.clone());
    let user_id = UserId::new();

    let token = store.issue(&user_id, CLIENT).await.unwrap();

    let (redeemed_user, client_id) = store.redeem(&token).await.unwrap();
    assert_eq!(redeemed_user, user_id);
    assert_eq!(client_id, CLIENT);
    assert!(matches!(
        store.redeem(&token).await,
        Err(AuthError::InvalidChallenge)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_challenge_redeem_succeeds_once() {
    let h = Harness::new().await;
    let store = Arc::new(TwoFactorChallengeStore::new(h.repo.clone(), h.config.clone()));
    let token = store.issue(&UserId::new(), CLIENT).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move { store.redeem(&token).await.is_ok() })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_totp_disable_requires_valid_code() {
    let h = Harness::new().await;
    let user = h.register("liz@example.com", PASSWORD).await.unwrap();
    let secret = h.enable_totp(&user).await;
    let totp = TotpSetupUseCase::new(h.repo.clone(), h.config.clone());

    let code = h.current_code(&secret, &user);
    assert!(matches!(
        totp.disable(&user.user_id, &other_code(&code)).await,
        Err(AuthError::InvalidChallenge)
    ));
    assert!(matches!(
        totp.setup(&user.user_id).await,
        Err(AuthError::InvalidInput(_))
    ));

    totp.disable(&user.user_id, &code).await.unwrap();
    h.login_tokens("liz@example.com").await;
}

// ============================================================================
// Refresh / Logout
// ============================================================================

#[tokio::test]
async fn test_refresh_rotates_and_keeps_session() {
    let h = Harness::new().await;
    h.register("mallory@example.com", PASSWORD).await.unwrap();
    let first = h.login_tokens("mallory@example.com").await;

    let second = h.refresh(&first.access_token, &first.refresh_token).await.unwrap();

    assert_eq!(second.session_id, first.session_id);
    assert_ne!(second.refresh_token, first.refresh_token);
    h.authenticate(&second.access_token).await.unwrap();

    // The replaced access token is blacklisted
    assert!(matches!(
        h.authenticate(&first.access_token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_replayed_refresh_token_revokes_user_sessions() {
    let h = Harness::new().await;
    h.register("niaj@example.com", PASSWORD).await.unwrap();
    let first = h.login_tokens("niaj@example.com").await;
    let other_session = h.login_tokens("niaj@example.com").await;

    let second = h.refresh(&first.access_token, &first.refresh_token).await.unwrap();

    let replay = h.refresh(&first.access_token, &first.refresh_token).await;
    assert!(matches!(replay, Err(AuthError::InvalidToken)));

    // Every refresh token of the user is now revoked
    assert!(matches!(
        h.refresh(&second.access_token, &second.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        h.refresh(&other_session.access_token, &other_session.refresh_token)
            .await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_refresh_refuses_replaced_access_token() {
    let h = Harness::new().await;
    h.register("nora@example.com", PASSWORD).await.unwrap();
    let first = h.login_tokens("nora@example.com").await;
    let second = h.refresh(&first.access_token, &first.refresh_token).await.unwrap();

    // A live refresh token cannot be paired with the blacklisted access token
    let err = h.refresh(&first.access_token, &second.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));

    // The refresh token was not spent
    h.refresh(&second.access_token, &second.refresh_token).await.unwrap();
}

#[tokio::test]
async fn test_refresh_token_bound_to_its_session() {
    let h = Harness::new().await;
    h.register("olivia@example.com", PASSWORD).await.unwrap();
    let a = h.login_tokens("olivia@example.com").await;
    let b = h.login_tokens("olivia@example.com").await;

    let err = h.refresh(&a.access_token, &b.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));

    // Neither token was spent
    h.refresh(&b.access_token, &b.refresh_token).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_succeeds_once() {
    let h = Harness::new().await;
    let user = h.register("peggy@example.com", PASSWORD).await.unwrap();
    let tokens = h.login_tokens("peggy@example.com").await;
    let use_case = Arc::new(h.refresh_use_case());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let use_case = use_case.clone();
            let input = RefreshInput {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
            };
            tokio::spawn(async move { use_case.execute(input).await.is_ok() })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    // The losers replayed a rotated token; the winner's successor is revoked too
    assert_eq!(h.repo.active_refresh_token_count(&user.user_id), 0);
}

#[tokio::test]
async fn test_validate_and_consume_is_one_shot() {
    let h = Harness::new().await;
    let user = h.register("quinn@example.com", PASSWORD).await.unwrap();
    let tokens = h.login_tokens("quinn@example.com").await;
    let store = h.refresh_tokens();

    assert!(!store.validate_and_consume(&user.user_id, "").await.unwrap());
    assert!(!store.validate_and_consume(&user.user_id, "garbage").await.unwrap());
    assert!(
        store
            .validate_and_consume(&user.user_id, &tokens.refresh_token)
            .await
            .unwrap()
    );
    assert!(
        !store
            .validate_and_consume(&user.user_id, &tokens.refresh_token)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_logout_revokes_session_and_blacklists_access_token() {
    let h = Harness::new().await;
    let user = h.register("rupert@example.com", PASSWORD).await.unwrap();
    let tokens = h.login_tokens("rupert@example.com").await;
    let other = h.login_tokens("rupert@example.com").await;

    let revoked = LogoutUseCase::new(h.repo.clone(), h.signer.clone(), h.config.clone())
        .execute(LogoutInput {
            user_id: user.user_id,
            access_token: tokens.access_token.clone(),
            refresh_token: None,
            revoke_all: false,
        })
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let blacklist = AccessTokenBlacklist::new(h.repo.clone(), h.config.clone());
    assert!(
        blacklist
            .is_blacklisted(&user.user_id, &tokens.access_token)
            .await
            .unwrap()
    );
    assert!(matches!(
        h.refresh(&tokens.access_token, &tokens.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));

    // The other session survives
    h.refresh(&other.access_token, &other.refresh_token).await.unwrap();
}

#[tokio::test]
async fn test_logout_everywhere() {
    let h = Harness::new().await;
    let user = h.register("sybil@example.com", PASSWORD).await.unwrap();
    let tokens = h.login_tokens("sybil@example.com").await;
    let other = h.login_tokens("sybil@example.com").await;

    LogoutUseCase::new(h.repo.clone(), h.signer.clone(), h.config.clone())
        .execute(LogoutInput {
            user_id: user.user_id,
            access_token: tokens.access_token.clone(),
            refresh_token: None,
            revoke_all: true,
        })
        .await
        .unwrap();

    assert!(matches!(
        h.refresh(&other.access_token, &other.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_logout_with_foreign_access_token() {
    let h = Harness::new().await;
    h.register("trent@example.com", PASSWORD).await.unwrap();
    let tokens = h.login_tokens("trent@example.com").await;

    let err = LogoutUseCase::new(h.repo.clone(), h.signer.clone(), h.config.clone())
        .execute(LogoutInput {
            user_id: UserId::new(),
            access_token: tokens.access_token,
            refresh_token: None,
            revoke_all: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn test_prune_keeps_live_records() {
    let h = Harness::new().await;
    h.register("uma@example.com", PASSWORD).await.unwrap();
    h.login_tokens("uma@example.com").await;

    let report = PruneExpiredUseCase::new(h.repo.clone(), h.config.clone())
        .execute()
        .await
        .unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(h.repo.refresh_token_count(), 1);
}

// ============================================================================
// Registration / Policy
// ============================================================================

#[tokio::test]
async fn test_register_reports_first_violated_rule() {
    let h = Harness::with_policy(AuthPolicy {
        min_password_length: 10,
        require_digit: true,
        require_uppercase: true,
        require_non_alphanumeric: true,
        ..AuthPolicy::default()
    })
    .await;

    let cases = [
        ("short", PolicyViolation::TooShort { min: 10 }),
        ("longenough-but", PolicyViolation::MissingDigit),
        ("longenough-1", PolicyViolation::MissingUppercase),
        ("Longenough1", PolicyViolation::MissingNonAlphanumeric),
    ];
    for (password, expected) in cases {
        match h.register("victor@example.com", password).await {
            Err(AuthError::PolicyViolation(violation)) => assert_eq!(violation, expected),
            other => panic!("{password}: expected {expected:?}, got {other:?}"),
        }
    }

    h.register("victor@example.com", "Longenough-1").await.unwrap();
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let h = Harness::new().await;
    h.register("walter@example.com", PASSWORD).await.unwrap();

    let err = h.register("WALTER@example.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::EmailAlreadyRegistered));
}

#[tokio::test]
async fn test_policy_update_requires_admin() {
    let h = Harness::new().await;
    let user = h.register("xena@example.com", PASSWORD).await.unwrap();
    let use_case = UpdateAuthPolicyUseCase::new(h.repo.clone(), h.config.clone());
    let policy = AuthPolicy {
        require_mfa: true,
        ..AuthPolicy::default()
    };

    assert!(matches!(
        use_case.execute(&user, CLIENT, policy.clone()).await,
        Err(AuthError::Forbidden)
    ));

    let mut admin = user.clone();
    admin.roles = vec![ADMIN_ROLE.to_string()];
    use_case.execute(&admin, CLIENT, policy.clone()).await.unwrap();
    assert!(matches!(
        use_case.execute(&admin, "missing", policy).await,
        Err(AuthError::ClientNotFound)
    ));

    // Takes effect on the next login
    assert!(matches!(
        h.login("xena@example.com", PASSWORD).await,
        Err(AuthError::TwoFactorRequired)
    ));
}

// ============================================================================
// Router
// ============================================================================

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_router_register_login_me() {
    let repo = InMemoryAuthRepository::new();
    repo.save_client(&OAuthClient::new(CLIENT, None)).await.unwrap();
    let app = auth_router_generic(repo, AuthConfig::development());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            serde_json::json!({
                "email": "yara@example.com",
                "password": PASSWORD,
                "clientId": CLIENT,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({
                "email": "yara@example.com",
                "password": PASSWORD,
                "clientId": CLIENT,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);

    let body = json_body(response).await;
    assert_eq!(body["status"], "authenticated");
    let access_token = body["accessToken"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], "yara@example.com");
    assert_eq!(body["twoFactorEnabled"], false);
}

#[tokio::test]
async fn test_router_rejects_missing_and_bad_tokens() {
    let repo = InMemoryAuthRepository::new();
    let app = auth_router_generic(repo, AuthConfig::development());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_router_login_error_is_problem_json() {
    let repo = InMemoryAuthRepository::new();
    let app = auth_router_generic(repo, AuthConfig::development());

    let response = app
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({
                "email": "zoe@example.com",
                "password": PASSWORD,
                "clientId": "missing",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_router_policy_update_needs_admin_role() {
    let repo = InMemoryAuthRepository::new();
    repo.save_client(&OAuthClient::new(CLIENT, None)).await.unwrap();
    let app = auth_router_generic(repo.clone(), AuthConfig::development());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            serde_json::json!({
                "email": "zack@example.com",
                "password": PASSWORD,
                "clientId": CLIENT,
            }),
        ))
        .await
        .unwrap();
    let user_id: UserId = json_body(response).await["userId"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({
                "email": "zack@example.com",
                "password": PASSWORD,
                "clientId": CLIENT,
            }),
        ))
        .await
        .unwrap();
    let access_token = json_body(response).await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();

    let update = || {
        let mut request = json_request(
            "PUT",
            "/clients/web/policy",
            serde_json::json!({ "minPasswordLength": 12, "requireDigit": true }),
        );
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {access_token}").parse().unwrap(),
        );
        request
    };

    let response = app.clone().oneshot(update()).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Same access token; roles are read from the store
    assert!(repo.set_roles(&user_id, vec![ADMIN_ROLE.to_string()]));
    let response = app.oneshot(update()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["clientId"], CLIENT);
    assert_eq!(body["authPolicy"]["minPasswordLength"], 12);
    assert_eq!(body["authPolicy"]["requireDigit"], true);
}
