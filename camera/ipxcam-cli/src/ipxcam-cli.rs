use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use ipxcam::{Buffer, Device, DeviceEvent, EventKind, Interface, ParamTree, ParamType, System};
use ipxcam_acquire::{
    AcquisitionSession, ConsoleReport, DeviceFilter, FrameConsumer, RawDumpConsumer, RunSummary,
    configure_trigger, find_devices, parse_ipv4, repair_subnet, trigger_frequency,
};
use ipxcam_config::IpxcamConfig;
use ipxcam_sim::{SimDevice, SimInterface, SimSystem};

const ENUMERATION_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Args)]
struct Record {
    /// set the recording duration in number of frames. 0 means until Enter
    /// is pressed. Defaults to the configuration file value.
    #[arg(short, long)]
    num_frames: Option<u64>,

    /// specify the name, serial number or unique id of the camera to use
    #[arg(short, long, conflicts_with = "all")]
    camera: Option<String>,

    /// record from all cameras at once
    #[arg(short, long)]
    all: bool,

    /// enable the hardware trigger from the pulse generator
    #[arg(short, long)]
    trigger: bool,

    /// save raw frames into this directory
    #[arg(short, long)]
    save_dir: Option<PathBuf>,

    /// print JSON lines instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ParamTarget {
    /// camera name, serial number or unique id. Defaults to the first camera.
    #[arg(short, long)]
    camera: Option<String>,

    /// use the transport layer parameters instead of the camera parameters
    #[arg(long)]
    transport: bool,
}

#[derive(Debug, Subcommand)]
enum ParamCommand {
    /// print the value of a parameter
    Get {
        name: String,
        #[command(flatten)]
        target: ParamTarget,
    },
    /// write a parameter, or execute it if it is a command
    Set {
        name: String,
        value: Option<String>,
        #[command(flatten)]
        target: ParamTarget,
    },
    /// list all parameters
    List {
        #[command(flatten)]
        target: ParamTarget,
    },
}

#[derive(Debug, Args)]
struct ForceIp {
    /// camera name, serial number or unique id
    camera: String,

    /// new address in dotted quad notation. Defaults to a free address in the
    /// interface subnet.
    ip: Option<String>,
}

#[derive(Debug, Args)]
struct SettingsFile {
    /// settings file
    path: PathBuf,

    /// camera name, serial number or unique id. Defaults to the first camera.
    #[arg(short, long)]
    camera: Option<String>,
}

/// camera utilities
#[derive(Debug, Parser)]
#[command(name = "ipxcam", author, version)]
struct Cli {
    /// configuration file (TOML)
    #[arg(long, global = true, env = "IPXCAM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// list interfaces and cameras
    List {
        /// print JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// record frames
    Record(Record),

    /// read and write camera parameters
    Param {
        #[command(subcommand)]
        action: ParamCommand,
    },

    /// move a GigE Vision camera into the subnet of its interface
    ForceIp(ForceIp),

    /// save the camera parameters to a file
    SaveConfig(SettingsFile),

    /// load the camera parameters from a file
    LoadConfig(SettingsFile),

    /// print the default configuration file
    DefaultConfig,
}

/// Frame consumer selected on the command line.
enum Saver {
    Discard,
    Raw(RawDumpConsumer),
}

impl FrameConsumer for Saver {
    fn consume(&mut self, buffer: &Buffer) -> anyhow::Result<()> {
        match self {
            Saver::Discard => Ok(()),
            Saver::Raw(raw) => raw.consume(buffer),
        }
    }
}

fn filter_for(camera: Option<&str>) -> DeviceFilter {
    match camera {
        Some(name) => DeviceFilter::by_name(name),
        None => DeviceFilter::default(),
    }
}

/// Find and open the camera `camera`, or the first camera.
fn open_device(
    system: &SimSystem,
    cfg: &IpxcamConfig,
    camera: Option<&str>,
) -> anyhow::Result<SimDevice> {
    let (iface, info) = find_devices(system, &filter_for(camera), ENUMERATION_TIMEOUT)?
        .into_iter()
        .next()
        .context("no cameras detected")?;
    let device = iface
        .create_device(&info, cfg.acquisition.access)
        .with_context(|| format!("opening {}", info.display_name))?;
    Ok(device)
}

fn list(system: &SimSystem, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    for iface in system.interfaces()? {
        iface.re_enumerate_devices(ENUMERATION_TIMEOUT)?;
        let infos = iface.device_info_list()?;
        if json {
            for info in infos.iter() {
                writeln!(out, "{}", serde_json::to_string(info)?)?;
            }
            continue;
        }
        writeln!(out, "{} ({})", iface.id(), iface.description())?;
        for info in infos.iter() {
            let ip = match &info.network {
                Some(net) => format!(" {}", net.ip),
                None => String::new(),
            };
            writeln!(
                out,
                "  {} [{:?}]{ip}",
                info.display_name, info.access_status
            )?;
        }
    }
    Ok(())
}

/// Thread waiting for a line on stdin.
fn enter_pressed() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            let _ = tx.send(());
        })?;
    Ok(rx)
}

/// Wait until every session reached its frame limit or `stop` fires.
fn wait(sessions: &[AcquisitionSession<SimDevice>], stop: Option<&Receiver<()>>) {
    loop {
        if sessions.iter().all(|s| s.is_finished()) {
            return;
        }
        if let Some(rx) = stop {
            match rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {}
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn start_session(
    iface: &SimInterface,
    info: &ipxcam::DeviceInfo,
    cfg: &IpxcamConfig,
    args: &Record,
    report: &ConsoleReport,
) -> anyhow::Result<AcquisitionSession<SimDevice>> {
    let mut session = AcquisitionSession::open(iface, info, cfg.acquisition.access)
        .with_context(|| format!("opening {}", info.display_name))?;
    let params = session.device().camera_parameters();

    let mut trigger = cfg.trigger.clone();
    trigger.enabled |= args.trigger;
    // Trigger nodes are left alone unless triggering was asked for.
    let trigger_hz = if trigger.enabled {
        configure_trigger(params, &trigger)?;
        let hz = trigger_frequency(params)?;
        info!("{}: trigger at {hz:.3} Hz", info.serial);
        Some(hz)
    } else {
        None
    };

    let mut settings = cfg.acquisition.session_settings(trigger_hz);
    if let Some(n) = args.num_frames {
        settings.num_frames = (n > 0).then_some(n);
    }

    let save_dir = args
        .save_dir
        .clone()
        .or_else(|| cfg.acquisition.save_dir.clone());
    let saver = match save_dir {
        Some(dir) => Saver::Raw(RawDumpConsumer::new(dir, &info.serial)?),
        None => Saver::Discard,
    };
    session.start(&settings, saver, report.clone())?;
    Ok(session)
}

fn record(
    system: &SimSystem,
    cfg: &IpxcamConfig,
    args: &Record,
    report: ConsoleReport,
    stop: Option<Receiver<()>>,
) -> anyhow::Result<Vec<RunSummary>> {
    let mut found = find_devices(
        system,
        &filter_for(args.camera.as_deref()),
        ENUMERATION_TIMEOUT,
    )?;
    if found.is_empty() {
        anyhow::bail!("no cameras detected");
    }
    if !args.all {
        found.truncate(1);
    }

    let mut sessions = Vec::with_capacity(found.len());
    let mut subscriptions = Vec::with_capacity(found.len());
    for (iface, info) in found.iter() {
        let session = start_session(iface, info, cfg, args, &report)?;
        let serial = info.serial.clone();
        let id = session
            .device()
            .events()
            .subscribe_events(Arc::new(move |ev: &DeviceEvent| {
                if ev.kind == EventKind::CameraDisconnected {
                    warn!("{serial} disconnected");
                }
            }));
        subscriptions.push(id);
        sessions.push(session);
    }

    wait(&sessions, stop.as_ref());

    let mut summaries = Vec::with_capacity(sessions.len());
    for (session, id) in sessions.into_iter().zip(subscriptions) {
        session.device().events().unsubscribe(id);
        if let Some(summary) = session.close() {
            if !summary.stop.is_clean() {
                warn!("{}: stop report {:?}", summary.serial, summary.stop);
            }
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

fn param(
    system: &SimSystem,
    cfg: &IpxcamConfig,
    action: &ParamCommand,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let target = match action {
        ParamCommand::Get { target, .. }
        | ParamCommand::Set { target, .. }
        | ParamCommand::List { target } => target,
    };
    let device = open_device(system, cfg, target.camera.as_deref())?;
    let tree = if target.transport {
        device.transport_parameters()
    } else {
        device.camera_parameters()
    };
    match action {
        ParamCommand::Get { name, .. } => {
            let p = tree.param(name)?;
            writeln!(out, "{}", p.value_string())?;
        }
        ParamCommand::Set { name, value, .. } => {
            let p = tree.param(name)?;
            match (p.param_type(), value) {
                (ParamType::Command, _) => tree.execute(name)?,
                (_, Some(value)) => tree.set_from_str(name, value)?,
                (_, None) => anyhow::bail!("a value is required to set \"{name}\""),
            }
            info!("{name} set");
        }
        ParamCommand::List { .. } => {
            for name in tree.names() {
                let p = match tree.param(&name) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("{name}: {e}");
                        continue;
                    }
                };
                if p.param_type() == ParamType::Category {
                    continue;
                }
                let access = match (p.readable, p.writable) {
                    (true, true) => "RW",
                    (true, false) => "RO",
                    (false, true) => "WO",
                    (false, false) => "NA",
                };
                writeln!(
                    out,
                    "{:<32} {:<8} {access} {}",
                    p.name,
                    format!("{:?}", p.param_type()),
                    p.value_string()
                )?;
            }
        }
    }
    Ok(())
}

fn force_ip(system: &SimSystem, args: &ForceIp, out: &mut dyn Write) -> anyhow::Result<()> {
    let (iface, info) = find_devices(system, &DeviceFilter::by_name(&args.camera), ENUMERATION_TIMEOUT)?
        .into_iter()
        .next()
        .with_context(|| format!("camera \"{}\" not found", args.camera))?;
    let ip = match &args.ip {
        Some(text) => match parse_ipv4(text) {
            0 => anyhow::bail!("invalid IP address \"{text}\""),
            ip => Some(ip),
        },
        None => None,
    };
    let fixed = repair_subnet(&iface, &info, ip, ENUMERATION_TIMEOUT)?;
    match &fixed.network {
        Some(net) => writeln!(out, "{} {}", fixed.display_name, net.ip)?,
        None => writeln!(out, "{} has no network configuration", fixed.display_name)?,
    }
    Ok(())
}

fn load_config(cli_config: Option<&PathBuf>) -> anyhow::Result<IpxcamConfig> {
    match cli_config {
        Some(path) => ipxcam_config::parse_config_file(path)
            .with_context(|| format!("reading config file {}", path.display())),
        None => Ok(ipxcam_config::default_config()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;

    let log_cfg = env_tracing_logger::LogConfig::with_default_filter(&cfg.logging.filter)
        .file(cfg.logging.file.as_ref());
    let _tracing_guard =
        env_tracing_logger::initiate_logging(&log_cfg).map_err(|e| anyhow::anyhow!(e))?;

    let system = SimSystem::new(cfg.cameras.clone())?;
    let mut stdout = std::io::stdout();

    match &cli.command {
        Command::List { json } => list(&system, *json, &mut stdout)?,
        Command::Record(args) => {
            let stop = match args.num_frames.unwrap_or(cfg.acquisition.num_frames) {
                0 => {
                    println!("Press Enter to stop.");
                    Some(enter_pressed()?)
                }
                _ => None,
            };
            let report = ConsoleReport::stdout().json(args.json);
            record(&system, &cfg, args, report, stop)?;
        }
        Command::Param { action } => param(&system, &cfg, action, &mut stdout)?,
        Command::ForceIp(args) => force_ip(&system, args, &mut stdout)?,
        Command::SaveConfig(args) => {
            let device = open_device(&system, &cfg, args.camera.as_deref())?;
            device.save_configuration(&args.path)?;
        }
        Command::LoadConfig(args) => {
            let device = open_device(&system, &cfg, args.camera.as_deref())?;
            device.load_configuration(&args.path)?;
        }
        Command::DefaultConfig => {
            print!("{}", ipxcam_config::to_toml_string(&ipxcam_config::default_config())?);
        }
    }

    Ok(())
}
