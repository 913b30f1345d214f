use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use marlin::{Axis, Config, Plane, Printer};
use tokio::io::{stdin, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive a Marlin printer over a serial link.", long_about = None)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the serial port from the configuration.
    #[arg(short, long)]
    port: Option<String>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Interactive command terminal (the default).
    Terminal,
    /// Scripted demo: home, raise Z, trace squares, release the motors.
    Demo,
}

#[derive(Debug, Clone, PartialEq)]
enum Request {
    Move(Axis, f64, Option<f64>),
    MoveXy(f64, f64, Option<f64>),
    MoveXyz(f64, f64, f64),
    Arc { clockwise: bool, x: f64, y: f64, radius: f64 },
    Home(String),
    Absolute,
    Relative,
    UnitsMm,
    UnitsInch,
    SelectPlane(Plane),
    Speed(f64),
    Info,
    MotorsOn(String),
    MotorsOff(String),
    Position,
    Quit,
}

fn parse_value(token: &str, what: &str) -> Result<f64, String> {
    token
        .parse::<f64>()
        .map_err(|_| format!("{} {:?} is not a number", what, token))
}

fn parse_request(input: &str) -> Result<Request, String> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    let trailing_feed = |tokens: &[&str]| -> Result<Option<f64>, String> {
        match tokens {
            [] => Ok(None),
            ["f", feed] => parse_value(feed, "feedrate").map(Some),
            rest => Err(format!("unexpected trailing input {:?}", rest.join(" "))),
        }
    };
    match tokens.as_slice() {
        [] => Err("empty command".into()),
        [axis @ ("x" | "y" | "z"), value, rest @ ..] => {
            let axis = Axis::from_letter(axis.chars().next().unwrap()).unwrap();
            let value = parse_value(value, "distance")?;
            Ok(Request::Move(axis, value, trailing_feed(rest)?))
        }
        ["xy", x, y, rest @ ..] => Ok(Request::MoveXy(
            parse_value(x, "x")?,
            parse_value(y, "y")?,
            trailing_feed(rest)?,
        )),
        ["xyz", x, y, z] => Ok(Request::MoveXyz(
            parse_value(x, "x")?,
            parse_value(y, "y")?,
            parse_value(z, "z")?,
        )),
        ["arc", direction @ ("cw" | "ccw"), x, y, radius] => Ok(Request::Arc {
            clockwise: *direction == "cw",
            x: parse_value(x, "x")?,
            y: parse_value(y, "y")?,
            radius: parse_value(radius, "radius")?,
        }),
        ["home"] => Ok(Request::Home(String::new())),
        ["home", axes] => Ok(Request::Home(axes.to_uppercase())),
        ["abs"] => Ok(Request::Absolute),
        ["rel"] => Ok(Request::Relative),
        ["mm"] => Ok(Request::UnitsMm),
        ["inch"] => Ok(Request::UnitsInch),
        ["plane", "xy"] => Ok(Request::SelectPlane(Plane::XY)),
        ["plane", "zx"] => Ok(Request::SelectPlane(Plane::ZX)),
        ["plane", "yz"] => Ok(Request::SelectPlane(Plane::YZ)),
        ["speed", value] => Ok(Request::Speed(parse_value(value, "speed")?)),
        ["info"] => Ok(Request::Info),
        ["on"] => Ok(Request::MotorsOn(String::new())),
        ["on", axes] => Ok(Request::MotorsOn(axes.to_uppercase())),
        ["off"] => Ok(Request::MotorsOff(String::new())),
        ["off", axes] => Ok(Request::MotorsOff(axes.to_uppercase())),
        ["pos"] => Ok(Request::Position),
        ["quit" | "exit"] => Ok(Request::Quit),
        _ => Err(format!("unrecognized command {:?}", input.trim())),
    }
}

async fn apply<S: AsyncRead + AsyncWrite + Unpin>(
    printer: &mut Printer<S>,
    request: Request,
) -> anyhow::Result<()> {
    match request {
        Request::Move(axis, value, None) => {
            printer.move_axis(axis, value).await?;
        }
        Request::Move(axis, value, Some(feed)) => {
            printer.move_axis_at(axis, value, feed).await?;
        }
        Request::MoveXy(x, y, None) => {
            printer.move_xy(x, y).await?;
        }
        Request::MoveXy(x, y, Some(feed)) => {
            printer.move_xy_at(x, y, feed).await?;
        }
        Request::MoveXyz(x, y, z) => {
            printer.move_xyz(x, y, z).await?;
        }
        Request::Arc { clockwise: true, x, y, radius } => {
            printer.move_arc_cw(x, y, None, radius).await?;
        }
        Request::Arc { clockwise: false, x, y, radius } => {
            printer.move_arc_ccw(x, y, None, radius).await?;
        }
        Request::Home(axes) => {
            printer.home(&axes).await?;
        }
        Request::Absolute => {
            printer.set_absolute().await?;
        }
        Request::Relative => {
            printer.set_relative().await?;
        }
        Request::UnitsMm => {
            printer.set_units_mm().await?;
        }
        Request::UnitsInch => {
            printer.set_units_inch().await?;
        }
        Request::SelectPlane(plane) => {
            printer.select_plane(plane).await?;
        }
        Request::Speed(value) => {
            printer.set_speed(value).await?;
        }
        Request::Info => {
            for line in printer.get_info().await? {
                println!("> {}", line);
            }
        }
        Request::MotorsOn(axes) => {
            printer.enable_motors(&axes).await?;
        }
        Request::MotorsOff(axes) => {
            printer.disable_motors(&axes).await?;
        }
        Request::Position => {
            let [x, y, z] = printer.position();
            println!("tracked position: X{:.3} Y{:.3} Z{:.3}", x, y, z);
        }
        Request::Quit => {}
    }
    Ok(())
}

async fn run_terminal<S: AsyncRead + AsyncWrite + Unpin>(
    printer: &mut Printer<S>,
) -> anyhow::Result<()> {
    println!("Connected. Type commands like `x 50`, `xy 50 60 f 1500`, `home`, `info`; `quit` leaves.");
    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_request(&line) {
            Ok(Request::Quit) => break,
            Ok(request) => {
                if let Err(error) = apply(printer, request).await {
                    eprintln!("error: {:#}", error);
                }
            }
            Err(message) => eprintln!("{}", message),
        }
    }
    Ok(())
}

/// The scripted sequence: home, raise Z, trace a square per configured step,
/// then release the motors.
async fn run_demo<S: AsyncRead + AsyncWrite + Unpin>(
    printer: &mut Printer<S>,
    config: &Config,
) -> anyhow::Result<()> {
    printer.home_all().await?.move_z(20.0).await?;
    for _ in 0..config.run_params.steps {
        printer
            .move_x(60.0)
            .await?
            .move_y(60.0)
            .await?
            .move_x(0.0)
            .await?
            .move_y(0.0)
            .await?;
    }
    printer.disable_motors("").await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    if let Some(port) = args.port {
        config.serial_settings.port = port;
    }
    let config = Arc::new(config);
    let mut printer = Printer::connect(config.clone()).await?;
    match args.mode.unwrap_or(Mode::Terminal) {
        Mode::Terminal => run_terminal(&mut printer).await,
        Mode::Demo => run_demo(&mut printer, &config).await,
    }
}
