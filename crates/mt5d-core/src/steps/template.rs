use super::{Step, StepContext};
use crate::error::{Mt5dError, Result};
use crate::io;
use crate::paths;
use crate::types::{Criticality, StepId};

/// Seed an empty prefix from the template baked into the image, which saves
/// the slow first `wineboot`.
pub struct UnpackTemplate;

impl Step for UnpackTemplate {
    fn id(&self) -> StepId {
        StepId::UnpackTemplate
    }

    fn criticality(&self) -> Criticality {
        Criticality::Recommended
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        Ok(paths::drive_c(&ctx.settings.wine_prefix).is_dir())
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let template = ctx.settings.prefix_template();
        if !template.is_dir() {
            return Err(Mt5dError::Verification(format!(
                "no prefix template at {}",
                template.display()
            )));
        }
        let copied = io::copy_tree(&template, &ctx.settings.wine_prefix)?;
        tracing::info!(files = copied, "prefix template unpacked");

        if !paths::drive_c(&ctx.settings.wine_prefix).is_dir() {
            return Err(Mt5dError::Verification(
                "prefix template did not contain drive_c".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::Sandbox;

    #[test]
    fn copies_template_into_empty_prefix() {
        let sb = Sandbox::new(&[]);
        let template = sb.settings.prefix_template();
        std::fs::create_dir_all(template.join("drive_c/windows")).unwrap();
        std::fs::write(template.join("system.reg"), "WINE REGISTRY").unwrap();

        let ctx = sb.ctx();
        assert!(!UnpackTemplate.already_done(&ctx).unwrap());
        UnpackTemplate.run(&ctx).unwrap();
        assert!(UnpackTemplate.already_done(&ctx).unwrap());
        assert!(sb.prefix().join("system.reg").is_file());
    }

    #[test]
    fn missing_template_fails() {
        let sb = Sandbox::new(&[]);
        let err = UnpackTemplate.run(&sb.ctx()).unwrap_err();
        assert!(err.to_string().contains("no prefix template"));
    }

    #[test]
    fn template_without_drive_c_fails_verification() {
        let sb = Sandbox::new(&[]);
        std::fs::create_dir_all(sb.settings.prefix_template()).unwrap();
        std::fs::write(sb.settings.prefix_template().join("user.reg"), "").unwrap();
        assert!(matches!(
            UnpackTemplate.run(&sb.ctx()),
            Err(Mt5dError::Verification(_))
        ));
    }
}
