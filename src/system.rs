use crate::channel::CommandChannel;
use crate::error::{HeosError, Result};
use crate::protocol::Command;
use crate::types::AccountStatus;

fn on_off(enable: bool) -> &'static str {
    if enable {
        "on"
    } else {
        "off"
    }
}

/// `system` command group
impl CommandChannel {
    /// Keep the connection alive
    pub async fn heart_beat(&self) -> Result<()> {
        self.call(Command::new("system", "heart_beat")).await?;
        Ok(())
    }

    /// Ask the device to push change events on this connection
    pub async fn register_for_change_events(&self, enable: bool) -> Result<()> {
        self.call(Command::new("system", "register_for_change_events").param("enable", on_off(enable)))
            .await?;
        Ok(())
    }

    /// Whether the device is signed in, and as whom
    pub async fn check_account(&self) -> Result<(AccountStatus, Option<String>)> {
        let result = self.call(Command::new("system", "check_account")).await?;

        let status = if result.var("signed_in").is_some() {
            AccountStatus::SignedIn
        } else if result.var("signed_out").is_some() {
            AccountStatus::SignedOut
        } else {
            return Err(HeosError::InvalidResponse(format!(
                "no account status in '{}'",
                result.header.message
            )));
        };

        Ok((status, result.var("un").map(str::to_string)))
    }

    /// Sign the device in to a HEOS account
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<()> {
        let command = Command::new("system", "sign_in")
            .param("un", username)
            .param("pw", password);

        match self.call(command).await {
            Ok(_) => Ok(()),
            Err(HeosError::CommandFailed(failure)) => Err(HeosError::SignInFailed(failure)),
            Err(e) => Err(e),
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.call(Command::new("system", "sign_out")).await?;
        Ok(())
    }

    pub async fn reboot(&self) -> Result<()> {
        self.call(Command::new("system", "reboot")).await?;
        Ok(())
    }

    pub async fn prettify_json_response(&self, enable: bool) -> Result<()> {
        self.call(Command::new("system", "prettify_json_response").param("enable", on_off(enable)))
            .await?;
        Ok(())
    }
}
