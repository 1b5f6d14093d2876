//! LinkedIn REST client used by the tools.
//!
//! Calls are made with the upstream access token attached to the verified
//! bearer token, never with bridge credentials.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, Response, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::config::UpstreamConfig;

/// Rest.li protocol version sent with every request
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Projection for the profile lookup
const PROFILE_PROJECTION: &str = "(localizedFirstName,localizedLastName,localizedHeadline,profilePicture(displayImage~digitalmediaAsset:playableStreams))";

/// Failures surfaced to the model as tool errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-2xx response from the API
    #[error("[{status}] LinkedIn API error: {message}")]
    Status {
        /// HTTP status line
        status: String,
        /// Provider-supplied message
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Unexpected LinkedIn API response format: {0}")]
    Format(String),

    /// Network failure
    #[error("LinkedIn API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Member profile as projected by [`PROFILE_PROJECTION`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// First name in the member's locale
    pub localized_first_name: String,
    /// Last name in the member's locale
    pub localized_last_name: String,
    /// Headline in the member's locale
    pub localized_headline: String,
    /// Display image renditions
    #[serde(default)]
    pub profile_picture: Option<ProfilePicture>,
}

/// `profilePicture` projection
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilePicture {
    /// Decorated display image
    #[serde(rename = "displayImage~")]
    pub display_image: DisplayImage,
}

/// Image renditions, smallest first
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayImage {
    /// Renditions
    #[serde(default)]
    pub elements: Vec<ImageElement>,
}

/// One image rendition
#[derive(Debug, Clone, Deserialize)]
pub struct ImageElement {
    /// Download locations
    #[serde(default)]
    pub identifiers: Vec<ImageIdentifier>,
}

/// Download location of a rendition
#[derive(Debug, Clone, Deserialize)]
pub struct ImageIdentifier {
    /// Absolute image URL
    pub identifier: String,
}

impl Profile {
    /// URL of the largest rendition (LinkedIn lists them in ascending size)
    #[must_use]
    pub fn picture_url(&self) -> Option<&str> {
        self.profile_picture
            .as_ref()?
            .display_image
            .elements
            .last()?
            .identifiers
            .last()
            .map(|i| i.identifier.as_str())
    }
}

/// Downloaded image ready for MCP image content
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// Content type reported by the image host
    pub mime_type: String,
    /// Base64 (standard alphabet, padded)
    pub data: String,
}

/// Thin client over the LinkedIn REST API.
pub struct LinkedInApi {
    http_client: Client,
    base_url: Url,
}

impl LinkedInApi {
    /// Build a client from upstream settings.
    pub fn new(config: &UpstreamConfig) -> crate::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.api_base()?,
        })
    }

    /// `GET /me` with the profile projection.
    pub async fn profile(&self, access_token: &str) -> Result<Profile, ApiError> {
        let body = self.get_me(access_token, PROFILE_PROJECTION).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Format(e.to_string()))
    }

    /// Member id from `GET /me?projection=(id)`.
    pub async fn person_id(&self, access_token: &str) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Me {
            id: String,
        }

        let body = self.get_me(access_token, "(id)").await?;
        let me: Me = serde_json::from_value(body).map_err(|e| ApiError::Format(e.to_string()))?;
        Ok(me.id)
    }

    /// Publish a public main-feed post authored by `person_id`.
    pub async fn create_post(
        &self,
        access_token: &str,
        person_id: &str,
        commentary: &str,
    ) -> Result<(), ApiError> {
        let entity = json!({
            "author": format!("urn:li:person:{person_id}"),
            "commentary": commentary,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": []
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false
        });

        let response = self
            .http_client
            .post(self.endpoint("posts"))
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .json(&entity)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Download an image and base64 encode it.
    pub async fn fetch_image(&self, url: &str) -> Result<EncodedImage, ApiError> {
        let response = check_status(self.http_client.get(url).send().await?).await?;

        let mime_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await?;

        debug!(size = bytes.len(), mime_type = %mime_type, "Downloaded profile picture");
        Ok(EncodedImage {
            mime_type,
            data: STANDARD.encode(&bytes),
        })
    }

    async fn get_me(&self, access_token: &str, projection: &str) -> Result<Value, ApiError> {
        // Rest.li projections must not be percent-encoded
        let url = format!("{}?projection={projection}", self.endpoint("me"));

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{resource}", self.base_url.as_str().trim_end_matches('/'))
    }
}

/// Pass 2xx responses through; turn anything else into [`ApiError::Status`].
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| "no error message".to_string());

    Err(ApiError::Status {
        status: status.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_picks_largest_picture() {
        // GIVEN: a profile with two renditions
        let body = json!({
            "localizedFirstName": "Ada",
            "localizedLastName": "Lovelace",
            "localizedHeadline": "Analyst",
            "profilePicture": {
                "displayImage~": {
                    "elements": [
                        {"identifiers": [{"identifier": "https://media.test/100.jpg"}]},
                        {"identifiers": [{"identifier": "https://media.test/800.jpg"}]}
                    ]
                }
            }
        });

        // WHEN: parsed
        let profile: Profile = serde_json::from_value(body).unwrap();

        // THEN: the last one wins
        assert_eq!(profile.picture_url(), Some("https://media.test/800.jpg"));
        assert_eq!(profile.localized_headline, "Analyst");
    }

    #[test]
    fn profile_without_picture_is_fine() {
        let body = json!({
            "localizedFirstName": "Ada",
            "localizedLastName": "Lovelace",
            "localizedHeadline": "Analyst"
        });
        let profile: Profile = serde_json::from_value(body).unwrap();
        assert!(profile.picture_url().is_none());
    }

    #[test]
    fn profile_missing_name_is_format_error() {
        let result: Result<Profile, _> =
            serde_json::from_value(json!({"localizedFirstName": "Ada"}));
        assert!(result.is_err());
    }

    #[test]
    fn api_error_messages() {
        let err = ApiError::Status {
            status: "401 Unauthorized".to_string(),
            message: "Invalid access token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[401 Unauthorized] LinkedIn API error: Invalid access token"
        );
        assert!(ApiError::Format("missing field".to_string())
            .to_string()
            .starts_with("Unexpected LinkedIn API response format"));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let api = LinkedInApi {
            http_client: Client::new(),
            base_url: Url::parse("https://api.linkedin.com/v2/").unwrap(),
        };
        assert_eq!(api.endpoint("me"), "https://api.linkedin.com/v2/me");
    }
}
