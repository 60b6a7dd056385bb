use std::{str::FromStr, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the password reset link for `token` to `to_email`.
    async fn send_password_reset(&self, to_email: &str, token: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.expose().to_string());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .with_context(|| format!("invalid SMTP host {}", config.host))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(timeout))
            .build();
        let from = Mailbox::from_str(&config.from)
            .with_context(|| format!("invalid MAIL_FROM address {}", config.from))?;

        Ok(Self {
            transport,
            from,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(&self, to_email: &str, token: &str) -> anyhow::Result<()> {
        let to = Mailbox::from_str(to_email)
            .with_context(|| format!("invalid recipient {}", to_email))?;
        let link = reset_link(&self.base_url, token);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Reset your password")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(reset_text(to_email, &link)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(reset_html(to_email, &link)),
                    ),
            )
            .context("build reset mail")?;

        self.transport.send(message).await.context("smtp send")?;
        info!("password reset mail sent");
        Ok(())
    }
}

pub(crate) fn reset_link(base_url: &str, token: &str) -> String {
    format!("{}/api/v1/users/reset-password/{}", base_url, token)
}

fn reset_text(recipient: &str, link: &str) -> String {
    format!(
        "Hi {recipient},\n\n\
         We received a request to reset your password. Open the link below to choose a new one:\n\n\
         {link}\n\n\
         If you did not ask for this, you can ignore this email."
    )
}

fn reset_html(recipient: &str, link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Reset your password</title>
  </head>
  <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; background-color: #ffffff; padding: 30px; border-radius: 8px;">
      <h2 style="color: #333;">Reset your password</h2>
      <p>Hi {recipient},</p>
      <p>We received a request to reset your password. Click the button below to choose a new one:</p>
      <p style="text-align: center;">
        <a href="{link}"
           style="background-color: #007bff; color: white; padding: 12px 20px; text-decoration: none; border-radius: 5px; display: inline-block;">
          Reset password
        </a>
      </p>
      <p>If you did not ask for this, you can safely ignore this email.</p>
    </div>
  </body>
</html>"#
    )
}
