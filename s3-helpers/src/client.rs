use aws_config::{
    meta::{credentials::CredentialsProviderChain, region::RegionProviderChain},
    retry::RetryConfig,
    stalled_stream_protection::StalledStreamProtectionConfig,
    BehaviorVersion,
};
use aws_sdk_s3::config::ProvideCredentials;
use color_eyre::{eyre::WrapErr as _, Result, Section as _};
use tracing::info;

const TIMEOUT_RETRY_ATTEMPTS: u32 = 5;

/// Helper function for setting up aws credentials and building the client.
///
/// `endpoint_url` overrides the endpoint, for s3-compatible stores; path-style
/// addressing is forced in that case because most of them require it.
pub async fn client(endpoint_url: Option<&str>) -> Result<aws_sdk_s3::Client> {
    let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
    let region = region_provider.region().await.expect("infallible");
    info!("using aws region: {region}");
    let credentials_provider = CredentialsProviderChain::default_provider().await;
    let _creds = credentials_provider
        .provide_credentials()
        .await
        .wrap_err("failed to get aws credentials")
        .with_note(|| {
            format!("AWS_PROFILE env var was {:?}", std::env::var("AWS_PROFILE"))
        })
        .with_suggestion(|| {
            "make sure that your aws credentials are set, e.g. via \
            ~/.aws/credentials, AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY, or sso"
        })
        .with_suggestion(|| "try running `aws sso login`")?;

    let retry_config =
        RetryConfig::standard().with_max_attempts(TIMEOUT_RETRY_ATTEMPTS);

    let config = aws_config::defaults(BehaviorVersion::v2024_03_28())
        .region(region_provider)
        .credentials_provider(credentials_provider)
        .retry_config(retry_config)
        .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&config);
    if let Some(url) = endpoint_url {
        builder = builder.endpoint_url(url).force_path_style(true);
    }

    Ok(aws_sdk_s3::Client::from_conf(builder.build()))
}
