use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::error::{AppError, Result};
use crate::models::session::OtpPurpose;

const SENDER_NAME: &str = "Education Platform";

/// Outbound mail over SMTP.
///
/// Without SMTP settings the mailer only logs what it would have sent.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl Mailer {
    pub fn from_config(config: Option<&SmtpConfig>) -> anyhow::Result<Self> {
        let Some(smtp) = config else {
            tracing::warn!("⚠️ SMTP_HOST not set; emails will be logged instead of sent");
            return Ok(Self {
                transport: None,
                from: format!("{} <no-reply@example.com>", SENDER_NAME).parse()?,
            });
        };

        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        };

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.to_string(),
            ))
            .build();

        Ok(Self {
            transport: Some(transport),
            from: format!("{} <{}>", SENDER_NAME, smtp.username).parse()?,
        })
    }

    /// Sends an HTML message.
    pub async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let Some(transport) = &self.transport else {
            tracing::info!("📧 (smtp disabled) to={} subject={:?}", to, subject);
            return Ok(());
        };

        let recipient: Mailbox = to
            .parse()
            .map_err(|e| AppError::Mail(format!("Invalid recipient {}: {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| AppError::Mail(format!("Message build failed: {}", e)))?;

        let response = transport
            .send(message)
            .await
            .map_err(|e| AppError::Mail(format!("SMTP send failed: {}", e)))?;

        tracing::info!("✅ Email sent to {} ({})", to, response.code());
        Ok(())
    }

    /// Sends an OTP for the given purpose.
    pub async fn send_otp(
        &self,
        to: &str,
        otp: &str,
        purpose: OtpPurpose,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.transport.is_none() {
            tracing::info!("📧 (smtp disabled) {:?} OTP for {}: {}", purpose, to, otp);
        }
        let minutes = (((expires_at - Utc::now()).num_seconds() + 59) / 60).max(1);
        self.send(to, purpose.subject(), otp_email_html(otp, purpose, minutes, expires_at))
            .await
    }
}

/// Renders the OTP email body.
pub fn otp_email_html(
    otp: &str,
    purpose: OtpPurpose,
    minutes: i64,
    expires_at: DateTime<Utc>,
) -> String {
    let intro = match purpose {
        OtpPurpose::EmailVerification => "Use the following OTP code to verify your account:",
        OtpPurpose::PasswordReset => "Use the following OTP code to reset your password:",
    };

    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 10px;">
  <h2 style="color: #333; text-align: center;">Education Platform - OTP Verification</h2>
  <p style="font-size: 16px; color: #666;">Hello there!</p>
  <p style="font-size: 16px; color: #666;">{intro}</p>
  <div style="background: #f4f4f4; padding: 20px; border-radius: 8px; text-align: center; margin: 20px 0; border: 2px dashed #ccc;">
    <h1 style="margin: 0; color: #333; letter-spacing: 8px; font-size: 36px; font-weight: bold;">{otp}</h1>
  </div>
  <div style="background: #fff3cd; padding: 15px; border-radius: 5px; border: 1px solid #ffeaa7; margin: 15px 0;">
    <p style="margin: 0; color: #856404; font-size: 14px;">
      <strong>Important:</strong> This OTP will expire in <strong>{minutes} minutes</strong>.
      Please use it before {deadline} UTC.
    </p>
  </div>
  <p style="font-size: 14px; color: #999; text-align: center;">If you didn't request this OTP, please ignore this email.</p>
  <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
  <p style="font-size: 12px; color: #999; text-align: center;">Education Platform Team<br>This is an automated message, please do not reply.</p>
</div>"#,
        intro = intro,
        otp = otp,
        minutes = minutes,
        deadline = expires_at.format("%H:%M:%S"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn otp_email_mentions_code_and_deadline() {
        let expires_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap();
        let html = otp_email_html("123456", OtpPurpose::EmailVerification, 5, expires_at);
        assert!(html.contains("123456"));
        assert!(html.contains("5 minutes"));
        assert!(html.contains("12:05:00 UTC"));
        assert!(html.contains("verify your account"));
    }

    #[test]
    fn reset_email_has_its_own_wording() {
        let html = otp_email_html("654321", OtpPurpose::PasswordReset, 5, Utc::now());
        assert!(html.contains("reset your password"));
    }

    #[tokio::test]
    async fn disabled_mailer_accepts_messages() {
        let mailer = Mailer::from_config(None).unwrap();
        mailer
            .send("student@example.com", "hello", "<p>hi</p>".to_string())
            .await
            .unwrap();
    }
}
