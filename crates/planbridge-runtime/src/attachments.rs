//! Uploads test artifacts as attachments of a remote result.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use planbridge_core::attachment_policy::{attachment_file_name, infer_extension, AttachmentMatcher};
use planbridge_core::identity::LocalTestIdentity;
use planbridge_core::test_result::{TestAttachment, TestResult};

use crate::api::TestPlanApi;
use crate::api_types::{AttachmentRequest, GENERAL_ATTACHMENT_TYPE};

/// Uploads matching attachments; failures are logged per attachment.
pub struct AttachmentUploader {
    api: Arc<dyn TestPlanApi>,
    matcher: AttachmentMatcher,
    upload_logs: bool,
}

impl AttachmentUploader {
    pub fn new(api: Arc<dyn TestPlanApi>, matcher: AttachmentMatcher, upload_logs: bool) -> Self {
        Self {
            api,
            matcher,
            upload_logs,
        }
    }

    /// Whether `result` carries anything this uploader would send.
    pub fn has_candidates(&self, result: &TestResult) -> bool {
        result
            .attachments
            .iter()
            .any(|attachment| self.matcher.matches(&attachment.name))
            || (self.upload_logs && (!result.stdout.is_empty() || !result.stderr.is_empty()))
    }

    /// Upload every matching attachment of `result` and return the created URLs.
    pub async fn upload(
        &self,
        run_id: u64,
        remote_result_id: u64,
        result: &TestResult,
        identity: &LocalTestIdentity,
    ) -> Vec<String> {
        let mut urls = Vec::new();
        for attachment in &result.attachments {
            if !self.matcher.matches(&attachment.name) {
                continue;
            }
            match self
                .upload_attachment(run_id, remote_result_id, attachment, identity)
                .await
            {
                Ok(url) => urls.push(url),
                Err(error) => tracing::warn!(
                    test = %identity.title,
                    attachment = %attachment.name,
                    error = %format!("{error:#}"),
                    "failed to upload attachment"
                ),
            }
        }

        if self.upload_logs {
            for (name, lines) in [("stdout", &result.stdout), ("stderr", &result.stderr)] {
                if lines.is_empty() {
                    continue;
                }
                let body = lines.concat();
                match self
                    .send(run_id, remote_result_id, name, "txt", body.as_bytes(), identity)
                    .await
                {
                    Ok(url) => urls.push(url),
                    Err(error) => tracing::warn!(
                        test = %identity.title,
                        attachment = name,
                        error = %format!("{error:#}"),
                        "failed to upload test log"
                    ),
                }
            }
        }
        urls
    }

    async fn upload_attachment(
        &self,
        run_id: u64,
        remote_result_id: u64,
        attachment: &TestAttachment,
        identity: &LocalTestIdentity,
    ) -> Result<String> {
        let bytes = match (&attachment.body, &attachment.path) {
            (Some(body), _) => body.clone(),
            (None, Some(path)) => std::fs::read(path)
                .with_context(|| format!("failed to read attachment {}", path.display()))?,
            (None, None) => return Err(anyhow!("attachment has neither a body nor a path")),
        };
        let extension = infer_extension(
            attachment.content_type.as_deref(),
            attachment.path.as_deref(),
        );
        self.send(
            run_id,
            remote_result_id,
            &attachment.name,
            &extension,
            &bytes,
            identity,
        )
        .await
    }

    async fn send(
        &self,
        run_id: u64,
        remote_result_id: u64,
        name: &str,
        extension: &str,
        bytes: &[u8],
        identity: &LocalTestIdentity,
    ) -> Result<String> {
        let request = AttachmentRequest {
            stream: STANDARD.encode(bytes),
            file_name: attachment_file_name(name, extension),
            comment: format!("{name} of {}", identity.title),
            attachment_type: GENERAL_ATTACHMENT_TYPE.to_string(),
        };
        let reference = self
            .api
            .create_result_attachment(run_id, remote_result_id, &request)
            .await
            .with_context(|| format!("failed to create attachment {}", request.file_name))?;
        Ok(reference.url)
    }
}
