use std::path::Path;

use super::{Step, StepContext};
use crate::config::Credentials;
use crate::error::{Mt5dError, Result};
use crate::io;
use crate::types::{Criticality, StepId};

/// Render the terminal's startup ini for automatic login.
pub fn render_login_config(creds: &Credentials) -> String {
    format!(
        "[Common]\n\
         Login={}\n\
         Password={}\n\
         Server={}\n\
         KeepPrivate=1\n\
         NewsEnable=0\n\
         CertInstall=1\n",
        creds.login, creds.password, creds.server
    )
}

/// The account number in an existing login ini, if any.
pub fn configured_login(path: &Path) -> Result<Option<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .find_map(|line| line.trim().strip_prefix("Login="))
        .map(|v| v.trim().to_string()))
}

/// Writes the login ini from `MT5_LOGIN` / `MT5_PASSWORD` / `MT5_SERVER`.
///
/// Completion is judged by content rather than a marker, so a changed
/// account is picked up on the next start.
pub struct GenerateLoginConfig;

impl Step for GenerateLoginConfig {
    fn id(&self) -> StepId {
        StepId::GenerateLoginConfig
    }

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InstallTerminal]
    }

    fn records_marker(&self) -> bool {
        false
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        let Some(creds) = ctx.settings.credentials() else {
            tracing::info!("no MT5_LOGIN/MT5_PASSWORD, terminal will start in manual-login mode");
            return Ok(true);
        };
        let current = configured_login(&ctx.settings.login_config())?;
        Ok(current.as_deref() == Some(creds.login.as_str()))
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let Some(creds) = ctx.settings.credentials() else {
            return Ok(());
        };
        let path = ctx.settings.login_config();
        io::atomic_write(&path, render_login_config(&creds).as_bytes())?;

        if configured_login(&path)?.as_deref() != Some(creds.login.as_str()) {
            return Err(Mt5dError::Verification(format!(
                "login config at {} does not name account {}",
                path.display(),
                creds.login
            )));
        }
        tracing::info!(login = %creds.login, server = %creds.server, "login config written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::Sandbox;
    use std::time::{Duration, SystemTime};

    fn with_creds(login: &str) -> Sandbox {
        Sandbox::new(&[
            ("MT5_LOGIN", login),
            ("MT5_PASSWORD", "s3cret"),
            ("MT5_SERVER", "Broker-Live"),
        ])
    }

    #[test]
    fn renders_common_section() {
        let text = render_login_config(&Credentials {
            login: "5012345".into(),
            password: "pw".into(),
            server: "MetaQuotes-Demo".into(),
        });
        assert_eq!(
            text,
            "[Common]\nLogin=5012345\nPassword=pw\nServer=MetaQuotes-Demo\nKeepPrivate=1\nNewsEnable=0\nCertInstall=1\n"
        );
    }

    #[test]
    fn writes_config_when_absent() {
        let sb = with_creds("5012345");
        let ctx = sb.ctx();
        assert!(!GenerateLoginConfig.already_done(&ctx).unwrap());
        GenerateLoginConfig.run(&ctx).unwrap();

        let text = std::fs::read_to_string(sb.settings.login_config()).unwrap();
        assert!(text.contains("Server=Broker-Live"));
        assert!(GenerateLoginConfig.already_done(&ctx).unwrap());
    }

    #[test]
    fn same_login_is_done_and_file_untouched() {
        let sb = with_creds("5012345");
        let path = sb.settings.login_config();
        GenerateLoginConfig.run(&sb.ctx()).unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        assert!(GenerateLoginConfig.already_done(&sb.ctx()).unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), old);
    }

    #[test]
    fn different_login_overwrites() {
        let sb = with_creds("7000001");
        let path = sb.settings.login_config();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[Common]\nLogin=5012345\nPassword=old\n").unwrap();

        assert!(!GenerateLoginConfig.already_done(&sb.ctx()).unwrap());
        GenerateLoginConfig.run(&sb.ctx()).unwrap();
        assert_eq!(configured_login(&path).unwrap().as_deref(), Some("7000001"));
    }

    #[test]
    fn no_credentials_skips_without_side_effects() {
        let sb = Sandbox::new(&[("MT5_LOGIN", "5012345")]);
        assert!(GenerateLoginConfig.already_done(&sb.ctx()).unwrap());
        GenerateLoginConfig.run(&sb.ctx()).unwrap();
        assert!(!sb.settings.login_config().exists());
        assert!(!sb.prefix().exists());
    }

    #[test]
    fn missing_server_defaults_to_demo() {
        let sb = Sandbox::new(&[("MT5_LOGIN", "1"), ("MT5_PASSWORD", "x")]);
        GenerateLoginConfig.run(&sb.ctx()).unwrap();
        let text = std::fs::read_to_string(sb.settings.login_config()).unwrap();
        assert!(text.contains("Server=MetaQuotes-Demo"));
    }
}
