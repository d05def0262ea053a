use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_FORGE_HOME: &str = ".forge";

pub fn default_home_dir() -> Utf8PathBuf {
    if let Some(home) = home_dir() {
        if let Some(home) = Utf8Path::from_path(&home) {
            return home.join(DEFAULT_FORGE_HOME);
        }
    }
    Utf8PathBuf::default()
}
