//! Provider gateway backed by the EC2 Query API.
//!
//! Requests are form-encoded `POST`s signed with Signature Version 4 and
//! responses are XML documents. The endpoint defaults to the regional EC2
//! endpoint and can be overridden to target a compatible service.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use roxmltree::Document;
use tracing::{debug, info};
use url::Url;
use url::form_urlencoded;

use crate::config::AwsConfig;
use crate::gateway::{GatewayFuture, InstanceStatus, LaunchRequest, ProviderGateway};

mod error;
mod response;
mod signing;

pub use error::Ec2GatewayError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2016-11-15";
const RUNNING_STATE: &str = "running";

const DESCRIBE_INSTANCE_STATUS: &str = "DescribeInstanceStatus";
const DESCRIBE_INSTANCES: &str = "DescribeInstances";
const RUN_INSTANCES: &str = "RunInstances";
const START_INSTANCES: &str = "StartInstances";
const STOP_INSTANCES: &str = "StopInstances";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

type Params = Vec<(String, String)>;

fn instance_params(instance_id: &str) -> Params {
    vec![("InstanceId.1".to_owned(), instance_id.to_owned())]
}

fn launch_params(request: &LaunchRequest) -> Params {
    let mut params = vec![
        ("ImageId".to_owned(), request.image_id.clone()),
        ("InstanceType".to_owned(), request.instance_type.clone()),
        ("KeyName".to_owned(), request.keypair.clone()),
        ("MinCount".to_owned(), "1".to_owned()),
        ("MaxCount".to_owned(), "1".to_owned()),
    ];
    params.extend(
        request
            .security_group_ids
            .iter()
            .enumerate()
            .map(|(index, group)| (format!("SecurityGroupId.{}", index + 1), group.clone())),
    );
    params
}

fn document<'b>(action: &str, body: &'b str) -> Result<Document<'b>, Ec2GatewayError> {
    response::parse(body).map_err(|message| Ec2GatewayError::Response {
        action: action.to_owned(),
        message,
    })
}

fn rejection(action: &str, status: u16, body: &str) -> Ec2GatewayError {
    let (code, message) = response::parse(body)
        .ok()
        .and_then(|doc| response::api_error(&doc))
        .unwrap_or_else(|| (String::from("Unknown"), body.trim().to_owned()));
    Ec2GatewayError::Api {
        action: action.to_owned(),
        status,
        code,
        message,
    }
}

/// EC2 implementation of [`ProviderGateway`].
#[derive(Clone, Debug)]
pub struct Ec2Gateway {
    config: AwsConfig,
    endpoint: Url,
    host: String,
}

impl Ec2Gateway {
    /// Builds a gateway from validated credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Ec2GatewayError::Config`] when credentials are missing or the
    /// endpoint is not an absolute HTTP URL.
    pub fn new(config: AwsConfig) -> Result<Self, Ec2GatewayError> {
        config.validate()?;
        let raw = config.endpoint_url();
        let endpoint = Url::parse(&raw)
            .map_err(|err| Ec2GatewayError::Config(format!("invalid endpoint {raw}: {err}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(name), Some(port)) => format!("{name}:{port}"),
            (Some(name), None) => name.to_owned(),
            (None, _) => {
                return Err(Ec2GatewayError::Config(format!(
                    "endpoint {raw} has no host"
                )));
            }
        };
        Ok(Self {
            config,
            endpoint,
            host,
        })
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call(&self, action: &str, params: Params) -> Result<String, Ec2GatewayError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", action)
            .append_pair("Version", API_VERSION)
            .extend_pairs(params)
            .finish();

        let credentials = signing::Credentials {
            access_key_id: self.config.access_key_id.trim(),
            secret_access_key: self.config.secret_access_key.trim(),
            session_token: self
                .config
                .session_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty()),
            region: self.config.region.trim(),
        };
        let signed = signing::sign_post(
            &credentials,
            &self.host,
            self.endpoint.path(),
            &body,
            Utc::now(),
        )
        .map_err(|err| Ec2GatewayError::Signing {
            action: action.to_owned(),
            message: err.0,
        })?;

        debug!(action, endpoint = %self.endpoint, "calling EC2");
        let mut request = HTTP_CLIENT
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, signing::FORM_CONTENT_TYPE)
            .header("x-amz-date", signed.amz_date)
            .header(AUTHORIZATION, signed.authorization);
        if let Some(token) = signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let transport = |err: reqwest::Error| Ec2GatewayError::Transport {
            action: action.to_owned(),
            message: err.to_string(),
        };
        let response = request.body(body).send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(rejection(action, status.as_u16(), &text))
        }
    }

    async fn describe_instances(
        &self,
        params: Params,
    ) -> Result<Vec<response::InstanceEntry>, Ec2GatewayError> {
        let body = self.call(DESCRIBE_INSTANCES, params).await?;
        let doc = document(DESCRIBE_INSTANCES, &body)?;
        Ok(response::described_instances(&doc))
    }
}

impl ProviderGateway for Ec2Gateway {
    type Error = Ec2GatewayError;

    fn describe_status<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> GatewayFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move {
            if instance_id.trim().is_empty() {
                return Ok(InstanceStatus::Absent);
            }
            let mut params = instance_params(instance_id);
            params.push(("IncludeAllInstances".to_owned(), "true".to_owned()));
            match self.call(DESCRIBE_INSTANCE_STATUS, params).await {
                Ok(body) => {
                    let doc = document(DESCRIBE_INSTANCE_STATUS, &body)?;
                    Ok(InstanceStatus::classify(&response::instance_state_name(
                        &doc,
                    )))
                }
                Err(err) if err.is_not_found() => Ok(InstanceStatus::Absent),
                Err(err) => Err(err),
            }
        })
    }

    fn create<'a>(&'a self, request: &'a LaunchRequest) -> GatewayFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let body = self.call(RUN_INSTANCES, launch_params(request)).await?;
            let doc = document(RUN_INSTANCES, &body)?;
            let instance_id = response::launched_instance_id(&doc);
            if instance_id.is_empty() {
                return Err(Ec2GatewayError::Response {
                    action: RUN_INSTANCES.to_owned(),
                    message: String::from("no instance identifier in response"),
                });
            }
            info!(
                instance_id = %instance_id,
                image_id = %request.image_id,
                instance_type = %request.instance_type,
                "launched instance"
            );
            Ok(instance_id)
        })
    }

    fn request_start<'a>(&'a self, instance_id: &'a str) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.call(START_INSTANCES, instance_params(instance_id))
                .await
                .map(drop)
        })
    }

    fn request_stop<'a>(&'a self, instance_id: &'a str) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.call(STOP_INSTANCES, instance_params(instance_id))
                .await
                .map(drop)
        })
    }

    fn public_address<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> GatewayFuture<'a, String, Self::Error> {
        Box::pin(async move {
            if instance_id.trim().is_empty() {
                return Ok(String::new());
            }
            match self.describe_instances(instance_params(instance_id)).await {
                Ok(instances) => Ok(instances
                    .into_iter()
                    .next()
                    .map(|entry| entry.public_ip)
                    .unwrap_or_default()),
                Err(err) if err.is_not_found() => Ok(String::new()),
                Err(err) => Err(err),
            }
        })
    }

    fn first_running_instance_id(&self) -> GatewayFuture<'_, String, Self::Error> {
        Box::pin(async move {
            let params = vec![
                ("Filter.1.Name".to_owned(), "instance-state-name".to_owned()),
                ("Filter.1.Value.1".to_owned(), RUNNING_STATE.to_owned()),
            ];
            let instances = self.describe_instances(params).await?;
            Ok(instances
                .into_iter()
                .find(|entry| entry.state.is_empty() || entry.state == RUNNING_STATE)
                .map(|entry| entry.instance_id)
                .unwrap_or_default())
        })
    }
}
