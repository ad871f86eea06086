//! Config command.

use crate::config::Settings;

/// Run config command - display current configuration.
pub fn run_config(settings: &Settings, show_paths: bool) {
    if show_paths {
        match Settings::user_config_path() {
            Some(path) => println!("# user settings:    {}", path.display()),
            None => println!("# user settings:    (no config directory)"),
        }
        println!("# project settings: .fsevents-bridge/settings.toml");
        println!();
    }

    match settings.to_toml() {
        Ok(toml_str) => println!("{toml_str}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
}
