use std::path::Path;

use codeweaver_core::config::IndexerSettings;

const CONFIG_RELATIVE_PATH: &str = ".codeweaver/codeweaver.toml";

pub fn init(project_root: &Path) -> anyhow::Result<()> {
  let path = project_root.join(CONFIG_RELATIVE_PATH);
  if path.exists() {
    anyhow::bail!("{} already exists", path.display());
  }
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&path, IndexerSettings::generate_template())?;
  println!("wrote {}", path.display());
  Ok(())
}

pub fn show(project_root: &Path) -> anyhow::Result<()> {
  let settings = IndexerSettings::load_for_project(project_root);
  println!("{}", toml::to_string_pretty(&settings)?);
  Ok(())
}
