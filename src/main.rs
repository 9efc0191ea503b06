use std::process;

use clap::error::{ContextKind, ErrorKind};
use clap::{Parser, ValueEnum};
use printmode::{apply_settings, ColorMode, Duplex, Orientation, SettingsError};

#[derive(Parser, Debug)]
#[command(
    name = "printmode",
    about = "Change a printer's default orientation, color and duplex via the windows spooler",
    version
)]
struct Cli {
    /// Printer name as known to the spooler.
    printer: String,
    /// Page orientation.
    #[arg(value_enum)]
    orientation: OrientationChoice,
    /// Color mode.
    #[arg(value_enum)]
    color: ColorChoice,
    /// Duplex mode.
    #[arg(value_enum)]
    duplex: DuplexChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrientationChoice {
    Portrait,
    Landscape,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorChoice {
    Color,
    Monochrome,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DuplexChoice {
    Vertical,
    Horizontal,
    Simplex,
}

impl From<OrientationChoice> for Orientation {
    fn from(choice: OrientationChoice) -> Self {
        match choice {
            OrientationChoice::Portrait => Orientation::Portrait,
            OrientationChoice::Landscape => Orientation::Landscape,
        }
    }
}

impl From<ColorChoice> for ColorMode {
    fn from(choice: ColorChoice) -> Self {
        match choice {
            ColorChoice::Color => ColorMode::Color,
            ColorChoice::Monochrome => ColorMode::Monochrome,
        }
    }
}

impl From<DuplexChoice> for Duplex {
    fn from(choice: DuplexChoice) -> Self {
        match choice {
            DuplexChoice::Vertical => Duplex::Vertical,
            DuplexChoice::Horizontal => Duplex::Horizontal,
            DuplexChoice::Simplex => Duplex::Simplex,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                // an unrecognized orientation/color/duplex token
                ErrorKind::InvalidValue => {
                    let token = err
                        .get(ContextKind::InvalidValue)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    SettingsError::InvalidArgument(token).code()
                }
                _ => 1,
            };
            process::exit(code);
        }
    };

    let orientation = Orientation::from(cli.orientation);
    let color = ColorMode::from(cli.color);
    let duplex = Duplex::from(cli.duplex);

    println!(
        "Setting {} {:?} {:?} {:?}",
        cli.printer, orientation, color, duplex
    );

    match apply_settings(&cli.printer, orientation, color, duplex) {
        Ok(()) => {
            println!("{} - settings changed", cli.printer);
        }
        Err(err) => {
            eprintln!(
                "{} - failed to change printer settings ({}): {}",
                cli.printer,
                err.code(),
                err
            );
            process::exit(err.code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_all_tokens() {
        let cli = Cli::try_parse_from([
            "printmode",
            "HP-LaserJet",
            "landscape",
            "monochrome",
            "simplex",
        ])
        .expect("parse");
        assert_eq!(cli.printer, "HP-LaserJet");
        assert_eq!(Orientation::from(cli.orientation), Orientation::Landscape);
        assert_eq!(ColorMode::from(cli.color), ColorMode::Monochrome);
        assert_eq!(Duplex::from(cli.duplex), Duplex::Simplex);
    }

    #[test]
    fn unknown_orientation_token_is_invalid() {
        let err = Cli::try_parse_from(["printmode", "HP-LaserJet", "sideways", "color", "simplex"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn missing_arguments_fail_parse() {
        let err = Cli::try_parse_from(["printmode", "HP-LaserJet", "landscape"]).unwrap_err();
        assert_ne!(err.kind(), ErrorKind::InvalidValue);
    }
}
