//! Integration tests for the HTTP identity, federation and upload clients,
//! run against a local mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use secrecy::SecretString;
use serde_json::json;
use tagpub_github::{ActionsIdentityTokenSource, HttpPublisher, HttpTokenExchange};
use tagpub_release::{
    ArtifactSet, Error, ExchangeOutcome, IdentityClaims, IdentityToken, IdentityTokenSource,
    PublishContext, PublishCredential, Publisher, TokenExchange,
};
use tempfile::TempDir;
use wiremock::matchers::{
    basic_auth, body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn claims() -> IdentityClaims {
    IdentityClaims {
        audience: "pypi".into(),
        repository: "org/repo".into(),
        environment: "pypi".into(),
        reference: "refs/tags/v1.2.3".into(),
    }
}

fn token() -> IdentityToken {
    IdentityToken::new("oidc-jwt".into(), "pypi")
}

mod identity_token {
    use super::*;

    #[tokio::test]
    async fn fetches_audience_scoped_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(query_param("api-version", "2.0"))
            .and(query_param("audience", "pypi"))
            .and(header("authorization", "Bearer runner-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "jwt-1"})))
            .expect(2)
            .mount(&server)
            .await;

        let source = ActionsIdentityTokenSource::new(
            format!("{}/token?api-version=2.0", server.uri()),
            SecretString::from("runner-secret"),
        )
        .unwrap();

        let first = source.fetch("pypi").await.unwrap();
        assert_eq!(first.expose(), "jwt-1");
        assert_eq!(first.audience(), "pypi");

        // Every fetch goes to the token service.
        source.fetch("pypi").await.unwrap();
    }

    #[tokio::test]
    async fn token_service_failure_is_trust_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad runner token"))
            .mount(&server)
            .await;

        let source = ActionsIdentityTokenSource::new(
            format!("{}/token?api-version=2.0", server.uri()),
            SecretString::from("runner-secret"),
        )
        .unwrap();

        let err = source.fetch("pypi").await.unwrap_err();
        assert_eq!(err.label(), "TrustExchangeFailure");
        assert!(err.to_string().contains("401"));
    }
}

mod federation {
    use super::*;

    #[tokio::test]
    async fn issues_namespace_scoped_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_/oidc/mint-token"))
            .and(body_partial_json(json!({
                "token": "oidc-jwt",
                "claims": {
                    "audience": "pypi",
                    "repository": "org/repo",
                    "environment": "pypi",
                    "ref": "refs/tags/v1.2.3"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": "pypi-minted",
                "namespace": "my-package",
                "expires": 4_102_444_800_i64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let exchange =
            HttpTokenExchange::new(format!("{}/_/oidc/mint-token", server.uri())).unwrap();
        match exchange.exchange(token(), &claims()).await.unwrap() {
            ExchangeOutcome::Issued(credential) => {
                assert_eq!(credential.namespace(), "my-package");
                assert_eq!(credential.expose(), "pypi-minted");
                assert!(credential.expires_at().is_some());
            }
            ExchangeOutcome::Rejected { reason, .. } => panic!("unexpected rejection: {reason}"),
        }
    }

    #[tokio::test]
    async fn claims_mismatch_is_rejection_with_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Token request failed",
                "errors": [{"code": "invalid-publisher", "description": "claims mismatch"}]
            })))
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new(format!("{}/mint", server.uri())).unwrap();
        match exchange.exchange(token(), &claims()).await.unwrap() {
            ExchangeOutcome::Rejected { reason, code } => {
                assert!(reason.contains("claims mismatch"));
                assert_eq!(code.as_deref(), Some("invalid-publisher"));
            }
            ExchangeOutcome::Issued(_) => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn server_error_is_failure_not_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new(format!("{}/mint", server.uri())).unwrap();
        let err = exchange.exchange(token(), &claims()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::TrustExchangeFailure { ref code, .. } if code.as_deref() == Some("federation-unavailable")
        ));
    }

    #[tokio::test]
    async fn success_without_token_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "not configured"})),
            )
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new(format!("{}/mint", server.uri())).unwrap();
        match exchange.exchange(token(), &claims()).await.unwrap() {
            ExchangeOutcome::Rejected { reason, .. } => assert_eq!(reason, "not configured"),
            ExchangeOutcome::Issued(_) => panic!("expected rejection"),
        }
    }
}

mod upload {
    use super::*;

    fn artifacts() -> (TempDir, ArtifactSet) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("my_package-1.2.3.tar.gz"), b"sdist").unwrap();
        std::fs::write(dir.path().join("my_package-1.2.3-py3-none-any.whl"), b"wheel").unwrap();
        let set = ArtifactSet::collect(dir.path()).unwrap();
        (dir, set)
    }

    fn ctx() -> PublishContext {
        PublishContext::new("my-package", "1.2.3", "v1.2.3")
    }

    fn credential() -> PublishCredential {
        PublishCredential::new("pypi-minted".into(), "my-package")
    }

    #[tokio::test]
    async fn uploads_every_artifact_with_token_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/legacy/"))
            .and(basic_auth("__token__", "pypi-minted"))
            .and(body_string_contains("file_upload"))
            .and(body_string_contains("sha256_digest"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(
            format!("{}/legacy/", server.uri()),
            "https://pypi.org/project",
        )
        .unwrap();
        let (_dir, set) = artifacts();
        let ctx = ctx();

        let receipt = publisher.publish(&ctx, &set, credential()).await.unwrap();
        assert_eq!(receipt.version, "1.2.3");
        assert_eq!(receipt.location, "https://pypi.org/project/my-package/1.2.3/");
        assert_eq!(
            receipt.uploaded,
            vec![
                "my_package-1.2.3-py3-none-any.whl".to_string(),
                "my_package-1.2.3.tar.gz".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("File already exists."),
            )
            .expect(1)
            .mount(&server)
            .await;

        let publisher =
            HttpPublisher::new(format!("{}/legacy/", server.uri()), "https://pypi.org/project")
                .unwrap();
        let (_dir, set) = artifacts();

        let err = publisher.publish(&ctx(), &set, credential()).await.unwrap_err();
        assert_eq!(err.label(), "PublishRejected");
        assert!(err.to_string().contains("File already exists"));
    }

    #[tokio::test]
    async fn refused_credential_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API Token"))
            .expect(1)
            .mount(&server)
            .await;

        let publisher =
            HttpPublisher::new(format!("{}/legacy/", server.uri()), "https://pypi.org/project")
                .unwrap();
        let (_dir, set) = artifacts();

        let err = publisher.publish(&ctx(), &set, credential()).await.unwrap_err();
        assert_eq!(err.label(), "PublishRejected");
        assert!(err.to_string().contains("Invalid API Token"));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let publisher =
            HttpPublisher::new(format!("{}/legacy/", server.uri()), "https://pypi.org/project")
                .unwrap();
        let (_dir, set) = artifacts();

        let err = publisher.publish(&ctx(), &set, credential()).await.unwrap_err();
        assert_eq!(err.label(), "PublishUnavailable");
    }

    #[tokio::test]
    async fn credential_for_other_namespace_never_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let publisher =
            HttpPublisher::new(format!("{}/legacy/", server.uri()), "https://pypi.org/project")
                .unwrap();
        let (_dir, set) = artifacts();
        let other = PublishCredential::new("pypi-minted".into(), "other-package");

        let err = publisher.publish(&ctx(), &set, other).await.unwrap_err();
        assert_eq!(err.label(), "InvalidState");
    }
}
