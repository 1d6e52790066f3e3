use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use object_store::aws::AwsCredential;
use object_store::CredentialProvider;
use tokio::sync::Mutex;

/// Refresh credentials this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Hands credentials from the AWS SDK provider chain to the S3 object store,
/// so both clients authenticate the same way (env, profile, SSO, IMDS).
#[derive(Debug)]
pub(crate) struct SdkCredentialBridge {
    provider: SharedCredentialsProvider,
    cached: Mutex<Option<CachedCredential>>,
}

#[derive(Debug)]
struct CachedCredential {
    credential: Arc<AwsCredential>,
    expires_at: Option<SystemTime>,
}

impl CachedCredential {
    fn is_fresh(&self, now: SystemTime) -> bool {
        match self.expires_at {
            Some(expires_at) => now + EXPIRY_MARGIN < expires_at,
            None => true,
        }
    }
}

impl SdkCredentialBridge {
    pub(crate) fn new(provider: SharedCredentialsProvider) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for SdkCredentialBridge {
    type Credential = AwsCredential;

    async fn get_credential(&self) -> object_store::Result<Arc<Self::Credential>> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref().filter(|c| c.is_fresh(SystemTime::now())) {
            return Ok(Arc::clone(&current.credential));
        }

        let credentials =
            self.provider
                .provide_credentials()
                .await
                .map_err(|err| object_store::Error::Generic {
                    store: "S3",
                    source: Box::new(err),
                })?;
        tracing::debug!(
            event = "object_store_credentials_refreshed",
            expires_at = ?credentials.expiry(),
            "refreshed object store credentials"
        );

        let credential = Arc::new(AwsCredential {
            key_id: credentials.access_key_id().to_string(),
            secret_key: credentials.secret_access_key().to_string(),
            token: credentials.session_token().map(str::to_string),
        });
        *cached = Some(CachedCredential {
            credential: Arc::clone(&credential),
            expires_at: credentials.expiry(),
        });
        Ok(credential)
    }
}
