use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use xrh::{Instance, Loader, XrhConfig};

/// Print what an OpenXR runtime offers, negotiated from an `xrh` config.
#[derive(Debug, Parser)]
#[command(name = "xrh-info", version)]
struct Args {
    /// TOML config to negotiate with. Defaults are used if it's missing
    config: Option<PathBuf>,

    /// Path to libopenxr_loader, instead of the system's
    #[arg(long, value_name = "PATH")]
    loader: Option<PathBuf>,
}

pub fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => XrhConfig::from_path(path)
            .with_context(|| format!("Unable to load {}", path.display()))?,
        None => XrhConfig::default(),
    };

    let loader = match &args.loader {
        Some(path) => Loader::load_from(path)?,
        None => Loader::load()?,
    };
    let mut instance = Instance::from_config(loader.runtime(), &config)?;
    instance.create().context("Unable to create an OpenXR instance")?;

    if let Some(runtime) = instance.runtime_properties() {
        println!(
            "Runtime:    {} {}.{}.{}",
            runtime.name,
            runtime.version.major(),
            runtime.version.minor(),
            runtime.version.patch()
        );
    }
    if let Some(system) = instance.system_properties() {
        println!("System:     {} (vendor {:#x})", system.name, system.vendor_id);
        println!(
            "            max swapchain {}x{}, {} layers, orientation tracking {}, position tracking {}",
            system.max_swapchain_width,
            system.max_swapchain_height,
            system.max_layer_count,
            system.orientation_tracking,
            system.position_tracking
        );
    }
    if let Some(requirements) = instance.graphics_requirements() {
        println!(
            "OpenGL ES:  {}.{} to {}.{}",
            requirements.min_api_version.major(),
            requirements.min_api_version.minor(),
            requirements.max_api_version.major(),
            requirements.max_api_version.minor()
        );
    }

    println!("Extensions: {} advertised", instance.available_extensions().len());
    for extension in instance.enabled_extensions() {
        println!("            {} v{} (enabled)", extension.name, extension.version);
    }

    if let Some(views) = instance.view_descriptors() {
        for (i, view) in views.iter().enumerate() {
            println!(
                "View {i}:     {}x{} ({} samples), max {}x{} ({} samples)",
                view.recommended_width,
                view.recommended_height,
                view.recommended_sample_count,
                view.max_width,
                view.max_height,
                view.max_sample_count
            );
        }
    }
    println!("FOV mutable: {}", instance.fov_mutable());

    instance.destroy()?;
    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_args() {
        let args = Args::try_parse_from(["xrh-info"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.loader.is_none());

        let args =
            Args::try_parse_from(["xrh-info", "quest.toml", "--loader", "/opt/libopenxr_loader.so"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("quest.toml")));
        assert_eq!(args.loader, Some(PathBuf::from("/opt/libopenxr_loader.so")));

        assert!(Args::try_parse_from(["xrh-info", "--loader"]).is_err());
        assert!(Args::try_parse_from(["xrh-info", "a.toml", "b.toml"]).is_err());
    }
}
