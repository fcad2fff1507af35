#![warn(rust_2018_idioms)]
use std::path::PathBuf;

use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use serde::Serialize;

use relic::{
    cfg,
    host::LiveHost,
    install::Installation,
    scan::Scanner,
    settings::SettingsReader,
    version::Version,
};

const USAGE: &str = "usage: relic [scan | backups | settings <disk>] [--log <file>]";

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Scan,
    Backups,
    Settings(PathBuf),
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    action: Action,
    /// Copy of the whole session log, written on exit.
    log: Option<PathBuf>,
}

impl Args {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut args = args.into_iter();
        let mut action = None;
        let mut log = None;
        while let Some(arg) = args.next() {
            let next = match arg.as_str() {
                "--log" => {
                    log = Some(args.next().ok_or_else(|| eyre!("--log needs a file"))?.into());
                    continue;
                }
                "scan" => Action::Scan,
                "backups" => Action::Backups,
                "settings" => Action::Settings(
                    args.next().ok_or_else(|| eyre!("settings needs a disk\n{USAGE}"))?.into(),
                ),
                other => bail!("unexpected argument {other:?}\n{USAGE}"),
            };
            if action.replace(next).is_some() {
                bail!("only one action at a time\n{USAGE}");
            }
        }
        Ok(Self {
            action: action.unwrap_or(Action::Scan),
            log,
        })
    }
}

#[derive(Serialize)]
struct Found<'a> {
    #[serde(flatten)]
    installation: &'a Installation,
    settings_available: bool,
    /// Unknown unless the config names the product version being installed.
    upgrade_candidate: Option<bool>,
}

impl<'a> Found<'a> {
    fn new(
        installation: &'a Installation,
        reader: &SettingsReader<'_, LiveHost>,
        target: Option<&Version>,
    ) -> Self {
        Self {
            installation,
            settings_available: reader.settings_available(installation),
            upgrade_candidate: target.map(|v| installation.is_upgrade_candidate(v)),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(action: &Action) -> Result<()> {
    let cfg = cfg::get_cfg()?;
    let host = LiveHost;
    let scanner = Scanner::new(&host, &cfg.scan);
    match action {
        Action::Scan => {
            let installs = scanner.find_installations()?;
            let target = cfg.product.version.as_ref();
            let reader = SettingsReader::new(&host, &cfg.scan);
            let found: Vec<_> = (installs.iter())
                .map(|i| Found::new(i, &reader, target))
                .collect();
            print_json(&found)
        }
        Action::Backups => print_json(&scanner.find_backups()?),
        Action::Settings(disk) => {
            let installs = scanner.find_installations()?;
            let Some(inst) = installs.iter().find(|i| &i.primary_disk == disk) else {
                bail!("no installation found on {}", disk.display());
            };
            match SettingsReader::new(&host, &cfg.scan).read_settings(inst) {
                Ok(settings) => print_json(&settings),
                Err(e) => {
                    tracing::info!("No settings to carry over from {inst}: {e}");
                    print_json(&None::<()>)
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let logging = relic::log::setup_logs_and_install_panic_hook()?;
    let args = Args::parse(std::env::args().skip(1))?;
    tracing::debug!(?args, "Starting relic");

    let res = run(&args.action);
    if let Err(e) = &res {
        tracing::error!("{e:?}");
    }
    logging.finish(args.log.as_deref())?;
    res
}
