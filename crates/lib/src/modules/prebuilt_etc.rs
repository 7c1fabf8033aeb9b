use crate::build::{ModuleContext, OUTPUT_FILES, OutputFiles};
use crate::module::{ArchSupport, Module, ModuleBase};
use crate::property_struct;
use crate::proptools::PropertyStruct;

property_struct! {
  pub struct PrebuiltEtcProperties {
    /// The file to install.
    pub src: Option<String> => [arch_variant, path],

    /// Installed file name, defaulting to the module name.
    pub filename: Option<String>,

    /// Use the base name of `src` as the installed file name.
    pub filename_from_src: Option<bool>,

    /// Directory under `etc/` to install into.
    pub sub_dir: Option<String>,

    /// Older spelling of `sub_dir`.
    pub relative_install_path: Option<String>,

    pub installable: Option<bool>,

    /// Extra names, installed as symlinks next to the file.
    pub symlinks: Vec<String>,
  }
}

/// A file installed as-is into the `etc` directory of its partition.
#[derive(Debug, Clone)]
pub struct PrebuiltEtc {
  base: ModuleBase,
  pub props: PrebuiltEtcProperties,
}

impl PrebuiltEtc {
  pub fn new() -> Self {
    Self {
      base: ModuleBase::new(ArchSupport::HostAndDevice),
      props: PrebuiltEtcProperties::default(),
    }
  }

  fn install_name(&self, ctx: &mut ModuleContext<'_>, src: &str) -> Option<String> {
    match (&self.props.filename, self.props.filename_from_src.unwrap_or(false)) {
      (Some(_), true) => {
        ctx.property_errorf("filename_from_src", "filename and filename_from_src can't be used simultaneously");
        None
      }
      (Some(name), false) => Some(name.clone()),
      (None, true) => Some(src.rsplit('/').next().unwrap_or(src).to_string()),
      (None, false) => Some(ctx.module_name().to_string()),
    }
  }

  fn install_dir(&self, ctx: &mut ModuleContext<'_>) -> Option<String> {
    match (&self.props.sub_dir, &self.props.relative_install_path) {
      (Some(_), Some(_)) => {
        ctx.property_errorf("sub_dir", "relative_install_path is set. Cannot set sub_dir");
        None
      }
      (Some(dir), None) | (None, Some(dir)) => Some(format!("etc/{}", dir)),
      (None, None) => Some("etc".to_string()),
    }
  }
}

impl Default for PrebuiltEtc {
  fn default() -> Self {
    Self::new()
  }
}

impl Module for PrebuiltEtc {
  crate::module_accessors!();

  fn property_roots(&self) -> Vec<&dyn PropertyStruct> {
    vec![&self.base.common, &self.props]
  }

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct> {
    vec![&mut self.base.common, &mut self.props]
  }

  fn generate_build_actions(&mut self, ctx: &mut ModuleContext<'_>) {
    let Some(src) = self.props.src.clone() else {
      ctx.property_errorf("src", "missing prebuilt source file");
      return;
    };
    let srcs = ctx.expand_sources("src", &[src], &[]);
    let src = match srcs.as_slice() {
      [one] => one.clone(),
      // missing, already reported or recorded as a missing dependency
      [] => return,
      many => {
        ctx.property_errorf("src", format!("expected exactly one file, got {}", many.len()));
        return;
      }
    };

    let (Some(name), Some(dir)) = (self.install_name(ctx, &src), self.install_dir(ctx)) else {
      return;
    };
    if self.props.installable == Some(false) {
      ctx.skip_install();
    }
    let installed = ctx.install_file(&dir, &name, &src);
    for link in &self.props.symlinks {
      ctx.install_symlink(&dir, link, &installed);
    }
    ctx.set_provider(&OUTPUT_FILES, OutputFiles::new(vec![src]));
  }
}
