//! The printer controller: one session against one connection.
//!
//! Motion calls validate against the configured soft limits, render a single
//! G-code line, write it to the transport and advance the tracked position.
//! Tracking is open loop: the firmware reports nothing back for ordinary
//! moves, so a failed or dropped command desynchronizes the tracked position
//! from the physical one until the next [`Printer::home`].

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::time::sleep;
use tokio_serial::SerialStream;
use tracing::{debug, info};

use crate::config::Config;
use crate::connection::{open_serial, read_line_timeout};
use crate::gcode::{
    parse_axis_set, Axis, AxisValues, Command, CoordinateMode, LineFormatter, Orientation, Plane,
    Unit,
};

#[derive(Error, Debug)]
pub enum PrinterError {
    #[error("target {target} on {axis:?} outside soft limit range [0, {limit}]")]
    LimitExceeded { axis: Axis, target: f64, limit: f64 },
    #[error("feedrate {speed} outside configured range [{min}, {max}]")]
    SpeedOutOfRange { speed: f64, min: f64, max: f64 },
    #[error("invalid axis letter {0:?}; expected only X, Y or Z")]
    InvalidAxis(char),
    #[error("serial transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error("printer did not respond within the configured timeout")]
    ResponseTimeout,
}

/// One connected printer. Owns the transport exclusively; dropping the
/// session closes it. Not safe to share between tasks.
pub struct Printer<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    config: Arc<Config>,
    position: [f64; 3],
    coordinate_mode: CoordinateMode,
    unit: Unit,
    plane: Plane,
    feedrate: f64,
}

impl Printer<SerialStream> {
    /// Opens the configured serial port and runs the startup sequence.
    pub async fn connect(config: Arc<Config>) -> Result<Printer<SerialStream>, PrinterError> {
        let stream = open_serial(&config.serial_settings).await?;
        info!(port = %config.serial_settings.port, "connected");
        let mut printer = Printer::new(stream, config);
        printer.initialize().await?;
        Ok(printer)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Printer<S> {
    /// Wraps an already-open transport. The tracked position starts at the
    /// configured origin and is only trustworthy after [`Printer::home`].
    pub fn new(stream: S, config: Arc<Config>) -> Printer<S> {
        let (reader, writer) = split(stream);
        let position = config.printer_params.origin;
        let feedrate = config.printer_params.speed.default;
        Printer {
            reader: BufReader::new(reader),
            writer,
            config,
            position,
            coordinate_mode: CoordinateMode::Absolute,
            unit: Unit::Millimeter,
            plane: Plane::XY,
            feedrate,
        }
    }

    /// Startup sequence: absolute coordinates, default feedrate.
    pub async fn initialize(&mut self) -> Result<&mut Self, PrinterError> {
        self.set_absolute().await?;
        let feedrate = self.config.printer_params.speed.default;
        self.send(&Command::SetFeedrate(feedrate)).await?;
        self.feedrate = feedrate;
        Ok(self)
    }

    /*
        Linear moves. The plain variants ride the session feedrate; the `_at`
        variants attach an explicit one, validated against the configured
        range before anything is written.
    */

    pub async fn move_axis(&mut self, axis: Axis, value: f64) -> Result<&mut Self, PrinterError> {
        self.linear_move(&[(axis, value)], None).await
    }

    pub async fn move_axis_at(
        &mut self,
        axis: Axis,
        value: f64,
        feedrate: f64,
    ) -> Result<&mut Self, PrinterError> {
        self.check_speed(feedrate)?;
        self.linear_move(&[(axis, value)], Some(feedrate)).await
    }

    pub async fn move_x(&mut self, value: f64) -> Result<&mut Self, PrinterError> {
        self.move_axis(Axis::X, value).await
    }

    pub async fn move_y(&mut self, value: f64) -> Result<&mut Self, PrinterError> {
        self.move_axis(Axis::Y, value).await
    }

    pub async fn move_z(&mut self, value: f64) -> Result<&mut Self, PrinterError> {
        self.move_axis(Axis::Z, value).await
    }

    pub async fn move_x_at(&mut self, value: f64, feedrate: f64) -> Result<&mut Self, PrinterError> {
        self.move_axis_at(Axis::X, value, feedrate).await
    }

    pub async fn move_y_at(&mut self, value: f64, feedrate: f64) -> Result<&mut Self, PrinterError> {
        self.move_axis_at(Axis::Y, value, feedrate).await
    }

    pub async fn move_z_at(&mut self, value: f64, feedrate: f64) -> Result<&mut Self, PrinterError> {
        self.move_axis_at(Axis::Z, value, feedrate).await
    }

    pub async fn move_xy(&mut self, x: f64, y: f64) -> Result<&mut Self, PrinterError> {
        self.linear_move(&[(Axis::X, x), (Axis::Y, y)], None).await
    }

    pub async fn move_xz(&mut self, x: f64, z: f64) -> Result<&mut Self, PrinterError> {
        self.linear_move(&[(Axis::X, x), (Axis::Z, z)], None).await
    }

    pub async fn move_yz(&mut self, y: f64, z: f64) -> Result<&mut Self, PrinterError> {
        self.linear_move(&[(Axis::Y, y), (Axis::Z, z)], None).await
    }

    pub async fn move_xyz(&mut self, x: f64, y: f64, z: f64) -> Result<&mut Self, PrinterError> {
        self.linear_move(&[(Axis::X, x), (Axis::Y, y), (Axis::Z, z)], None)
            .await
    }

    pub async fn move_xy_at(
        &mut self,
        x: f64,
        y: f64,
        feedrate: f64,
    ) -> Result<&mut Self, PrinterError> {
        self.check_speed(feedrate)?;
        self.linear_move(&[(Axis::X, x), (Axis::Y, y)], Some(feedrate))
            .await
    }

    pub async fn move_xyz_at(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        feedrate: f64,
    ) -> Result<&mut Self, PrinterError> {
        self.check_speed(feedrate)?;
        self.linear_move(&[(Axis::X, x), (Axis::Y, y), (Axis::Z, z)], Some(feedrate))
            .await
    }

    /*
        Arc moves in the firmware's current plane. The target is the XY (and
        optionally Z) endpoint; R is the arc radius. No deadband here: an arc
        ending where it started is a full circle, not a no-op.
    */

    pub async fn move_arc_cw(
        &mut self,
        x: f64,
        y: f64,
        z: Option<f64>,
        radius: f64,
    ) -> Result<&mut Self, PrinterError> {
        self.arc_move(Orientation::Clockwise, x, y, z, radius).await
    }

    pub async fn move_arc_ccw(
        &mut self,
        x: f64,
        y: f64,
        z: Option<f64>,
        radius: f64,
    ) -> Result<&mut Self, PrinterError> {
        self.arc_move(Orientation::Counterclockwise, x, y, z, radius)
            .await
    }

    /// Rise by `height`, travel along `axis`, then lower back, as one batched
    /// write at the session feedrate.
    pub async fn hop(
        &mut self,
        axis: Axis,
        distance: f64,
        height: f64,
    ) -> Result<&mut Self, PrinterError> {
        let z_start = self.position[Axis::Z.index()];
        let z_raised = z_start + height;
        self.check_limit(Axis::Z, z_raised)?;
        let target = self.axis_target(axis, distance);
        self.check_limit(axis, target)?;
        let feedrate = Some(self.feedrate);
        let commands = match self.coordinate_mode {
            CoordinateMode::Absolute => vec![
                Command::Move {
                    position: AxisValues(vec![(Axis::Z, z_raised)]),
                    feedrate,
                },
                Command::Move {
                    position: AxisValues(vec![(axis, target)]),
                    feedrate,
                },
                Command::Move {
                    position: AxisValues(vec![(Axis::Z, z_start)]),
                    feedrate,
                },
            ],
            CoordinateMode::Incremental => vec![
                Command::Move {
                    position: AxisValues(vec![(Axis::Z, height)]),
                    feedrate,
                },
                Command::Move {
                    position: AxisValues(vec![(axis, distance)]),
                    feedrate,
                },
                Command::Move {
                    position: AxisValues(vec![(Axis::Z, -height)]),
                    feedrate,
                },
            ],
        };
        self.send_batch(&commands).await?;
        self.position[axis.index()] = target;
        Ok(self)
    }

    /*
        Modal state. Each emits its mnemonic and records the new mode; unit
        switching never converts tracked coordinates, callers own unit
        consistency.
    */

    pub async fn set_absolute(&mut self) -> Result<&mut Self, PrinterError> {
        self.send(&Command::SetCoordinateMode(CoordinateMode::Absolute))
            .await?;
        self.coordinate_mode = CoordinateMode::Absolute;
        Ok(self)
    }

    pub async fn set_relative(&mut self) -> Result<&mut Self, PrinterError> {
        self.send(&Command::SetCoordinateMode(CoordinateMode::Incremental))
            .await?;
        self.coordinate_mode = CoordinateMode::Incremental;
        Ok(self)
    }

    pub async fn set_units_mm(&mut self) -> Result<&mut Self, PrinterError> {
        self.send(&Command::SetUnits(Unit::Millimeter)).await?;
        self.unit = Unit::Millimeter;
        Ok(self)
    }

    pub async fn set_units_inch(&mut self) -> Result<&mut Self, PrinterError> {
        self.send(&Command::SetUnits(Unit::Inch)).await?;
        self.unit = Unit::Inch;
        Ok(self)
    }

    pub async fn select_plane(&mut self, plane: Plane) -> Result<&mut Self, PrinterError> {
        self.send(&Command::SetPlane(plane)).await?;
        self.plane = plane;
        Ok(self)
    }

    /// Sets the session feedrate, taking mm/s and converting to the mm/min
    /// the firmware expects, rounded to two decimals.
    pub async fn set_speed(&mut self, mm_per_s: f64) -> Result<&mut Self, PrinterError> {
        let mm_per_min = (mm_per_s * 60.0 * 100.0).round() / 100.0;
        self.check_speed(mm_per_min)?;
        self.send(&Command::SetFeedrate(mm_per_min)).await?;
        self.feedrate = mm_per_min;
        Ok(self)
    }

    /// Auto-homes the given axes (`""` for all) and resets their tracked
    /// coordinates to the configured origin. This is the only point where
    /// the tracked position resynchronizes with a physical reference.
    pub async fn home(&mut self, axes: &str) -> Result<&mut Self, PrinterError> {
        let mut axes = parse_axis_set(axes).map_err(PrinterError::InvalidAxis)?;
        if axes.is_empty() {
            axes = Axis::ALL.to_vec();
        }
        self.send(&Command::Home(axes.clone())).await?;
        let origin = self.config.printer_params.origin;
        for axis in &axes {
            self.position[axis.index()] = origin[axis.index()];
        }
        info!(?axes, "homed");
        Ok(self)
    }

    pub async fn home_all(&mut self) -> Result<&mut Self, PrinterError> {
        self.home("").await
    }

    pub async fn enable_motors(&mut self, axes: &str) -> Result<&mut Self, PrinterError> {
        let axes = self.motor_axes(axes)?;
        self.send(&Command::EnableMotors(axes)).await?;
        Ok(self)
    }

    pub async fn disable_motors(&mut self, axes: &str) -> Result<&mut Self, PrinterError> {
        let axes = self.motor_axes(axes)?;
        self.send(&Command::DisableMotors(axes)).await?;
        Ok(self)
    }

    /// Requests the firmware's identification block and returns the raw
    /// response lines, up to and including the `ok` terminator.
    pub async fn get_info(&mut self) -> Result<Vec<String>, PrinterError> {
        self.send(&Command::InfoRequest).await?;
        let limit = Duration::from_secs_f64(self.config.serial_settings.timeout);
        let mut lines = Vec::new();
        loop {
            match read_line_timeout(&mut self.reader, limit).await {
                Ok(Some(line)) => {
                    let done = line.trim_start().starts_with("ok");
                    lines.push(line);
                    if done {
                        break;
                    }
                }
                Ok(None) if lines.is_empty() => {
                    return Err(PrinterError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream closed before the printer responded",
                    )))
                }
                Ok(None) => break,
                Err(PrinterError::ResponseTimeout) if !lines.is_empty() => break,
                Err(error) => return Err(error),
            }
        }
        Ok(lines)
    }

    /*
        Introspection. Tracked state only; nothing is read back from the
        firmware.
    */

    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    pub fn coordinate_mode(&self) -> CoordinateMode {
        self.coordinate_mode
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    pub fn feedrate(&self) -> f64 {
        self.feedrate
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /*
        Internals
    */

    async fn linear_move(
        &mut self,
        request: &[(Axis, f64)],
        feedrate: Option<f64>,
    ) -> Result<&mut Self, PrinterError> {
        let mut targets = Vec::with_capacity(request.len());
        for (axis, value) in request {
            let target = self.axis_target(*axis, *value);
            self.check_limit(*axis, target)?;
            targets.push((*axis, target));
        }
        let deadband = self.config.run_params.coord_deadband;
        if targets
            .iter()
            .all(|(axis, target)| (target - self.position[axis.index()]).abs() < deadband)
        {
            debug!("requested move below deadband, skipping");
            return Ok(self);
        }
        // In incremental mode the firmware expects offsets, not targets.
        let words = match self.coordinate_mode {
            CoordinateMode::Absolute => AxisValues(targets.clone()),
            CoordinateMode::Incremental => AxisValues(request.to_vec()),
        };
        self.send(&Command::Move {
            position: words,
            feedrate,
        })
        .await?;
        for (axis, target) in targets {
            self.position[axis.index()] = target;
        }
        Ok(self)
    }

    async fn arc_move(
        &mut self,
        orientation: Orientation,
        x: f64,
        y: f64,
        z: Option<f64>,
        radius: f64,
    ) -> Result<&mut Self, PrinterError> {
        let mut request = vec![(Axis::X, x), (Axis::Y, y)];
        if let Some(z) = z {
            request.push((Axis::Z, z));
        }
        let mut targets = Vec::with_capacity(request.len());
        for (axis, value) in &request {
            let target = self.axis_target(*axis, *value);
            self.check_limit(*axis, target)?;
            targets.push((*axis, target));
        }
        let words = match self.coordinate_mode {
            CoordinateMode::Absolute => AxisValues(targets.clone()),
            CoordinateMode::Incremental => AxisValues(request),
        };
        self.send(&Command::ArcMove {
            orientation,
            position: words,
            radius,
            feedrate: None,
        })
        .await?;
        for (axis, target) in targets {
            self.position[axis.index()] = target;
        }
        Ok(self)
    }

    fn axis_target(&self, axis: Axis, value: f64) -> f64 {
        match self.coordinate_mode {
            CoordinateMode::Absolute => value,
            CoordinateMode::Incremental => self.position[axis.index()] + value,
        }
    }

    fn check_limit(&self, axis: Axis, target: f64) -> Result<(), PrinterError> {
        let limit = self.config.printer_params.soft_limits.for_axis(axis);
        if target < 0.0 || target > limit {
            return Err(PrinterError::LimitExceeded {
                axis,
                target,
                limit,
            });
        }
        Ok(())
    }

    fn check_speed(&self, feedrate: f64) -> Result<(), PrinterError> {
        let range = self.config.printer_params.speed;
        if feedrate < range.min || feedrate > range.max {
            return Err(PrinterError::SpeedOutOfRange {
                speed: feedrate,
                min: range.min,
                max: range.max,
            });
        }
        Ok(())
    }

    fn motor_axes(&self, axes: &str) -> Result<Vec<Axis>, PrinterError> {
        let axes = parse_axis_set(axes).map_err(PrinterError::InvalidAxis)?;
        Ok(if axes.is_empty() {
            Axis::ALL.to_vec()
        } else {
            axes
        })
    }

    fn render(&self, command: &Command) -> String {
        let formatter = LineFormatter {
            table: &self.config.gcode,
            float_digits: self.config.run_params.resolution as usize,
            command,
        };
        format!("{}\n", formatter)
    }

    async fn send(&mut self, command: &Command) -> Result<(), PrinterError> {
        let line = self.render(command);
        self.writer.write_all(line.as_bytes()).await?;
        debug!("sent {}", line.trim_end());
        self.pause().await;
        Ok(())
    }

    async fn send_batch(&mut self, commands: &[Command]) -> Result<(), PrinterError> {
        for chunk in commands.chunks(self.config.run_params.batch_size) {
            let buffer: String = chunk.iter().map(|command| self.render(command)).collect();
            self.writer.write_all(buffer.as_bytes()).await?;
            debug!("sent batch of {}", chunk.len());
        }
        self.pause().await;
        Ok(())
    }

    async fn pause(&self) {
        let delay = self.config.run_params.delay;
        if delay > 0.0 {
            sleep(Duration::from_secs_f64(delay)).await;
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        tokio::io::{duplex, AsyncReadExt, DuplexStream},
    };

    const TEST_CONFIG: &str = r#"{
        "serial_settings": { "port": "/dev/null", "baudrate": 115200, "timeout": 1.0 },
        "printer_params": {
            "origin": [0.0, 0.0, 0.0],
            "physical_limits": { "x": 250.0, "y": 250.0, "z": 220.0 },
            "soft_limits": { "x": 240.0, "y": 240.0, "z": 210.0 },
            "speed": { "default": 5000.0, "min": 100.0, "max": 12000.0 }
        },
        "run_params": {
            "delay": 0.0, "resolution": 3, "batch_size": 8, "steps": 4,
            "coord_deadband": 0.01
        },
        "gcode": {
            "LINEAR_MOVE": "G0",
            "ARC_CW": "G2",
            "ARC_CCW": "G3",
            "AUTO_HOME": "G28",
            "SET_ABS": "G90",
            "SET_REL": "G91",
            "SET_UNITS_MM": "G21",
            "SET_UNITS_INCH": "G20",
            "SET_XY_PLANE": "G17",
            "SET_ZX_PLANE": "G18",
            "SET_YZ_PLANE": "G19",
            "ENABLE_MOTORS": "M17",
            "DISABLE_MOTORS": "M18",
            "GET_INFO": "M115"
        }
    }"#;

    fn test_printer() -> (Printer<DuplexStream>, DuplexStream) {
        let config = Arc::new(Config::from_json(TEST_CONFIG).unwrap());
        let (near, far) = duplex(4096);
        (Printer::new(near, config), far)
    }

    async fn collect_output(printer: Printer<DuplexStream>, mut far: DuplexStream) -> String {
        drop(printer);
        let mut output = String::new();
        far.read_to_string(&mut output).await.unwrap();
        output
    }

    #[tokio::test]
    async fn test_absolute_move_formats_and_tracks() {
        let (mut printer, far) = test_printer();
        printer.move_x(5.0).await.unwrap();
        assert_eq!(printer.position(), [5.0, 0.0, 0.0]);
        assert_eq!(collect_output(printer, far).await, "G0 X5.000\n");
    }

    #[tokio::test]
    async fn test_chained_moves_issue_lines_in_order() {
        let (mut printer, far) = test_printer();
        printer
            .move_x(10.0)
            .await
            .unwrap()
            .move_y(10.0)
            .await
            .unwrap()
            .move_x(0.0)
            .await
            .unwrap()
            .move_y(0.0)
            .await
            .unwrap();
        assert_eq!(printer.position(), [0.0, 0.0, 0.0]);
        assert_eq!(
            collect_output(printer, far).await,
            "G0 X10.000\nG0 Y10.000\nG0 X0.000\nG0 Y0.000\n"
        );
    }

    #[tokio::test]
    async fn test_relative_mode_sends_offsets() {
        let (mut printer, far) = test_printer();
        printer.set_relative().await.unwrap();
        printer.move_x(10.0).await.unwrap();
        printer.move_x(5.0).await.unwrap();
        assert_eq!(printer.position(), [15.0, 0.0, 0.0]);
        assert_eq!(
            collect_output(printer, far).await,
            "G91\nG0 X10.000\nG0 X5.000\n"
        );
    }

    #[tokio::test]
    async fn test_limit_exceeded_sends_nothing() {
        let (mut printer, far) = test_printer();
        let result = printer.move_x(250.0).await;
        assert!(matches!(
            result,
            Err(PrinterError::LimitExceeded {
                axis: Axis::X,
                ..
            })
        ));
        assert_eq!(printer.position(), [0.0, 0.0, 0.0]);
        assert_eq!(collect_output(printer, far).await, "");
    }

    #[tokio::test]
    async fn test_negative_target_rejected() {
        let (mut printer, far) = test_printer();
        printer.set_relative().await.unwrap();
        let result = printer.move_y(-1.0).await;
        assert!(matches!(result, Err(PrinterError::LimitExceeded { .. })));
        assert_eq!(printer.position(), [0.0, 0.0, 0.0]);
        assert_eq!(collect_output(printer, far).await, "G91\n");
    }

    #[tokio::test]
    async fn test_speed_out_of_range_sends_nothing() {
        let (mut printer, far) = test_printer();
        let result = printer.move_x_at(5.0, 50.0).await;
        assert!(matches!(
            result,
            Err(PrinterError::SpeedOutOfRange { speed, .. }) if speed == 50.0
        ));
        assert_eq!(collect_output(printer, far).await, "");
    }

    #[tokio::test]
    async fn test_move_with_feedrate() {
        let (mut printer, far) = test_printer();
        printer.move_x_at(5.0, 1000.0).await.unwrap();
        assert_eq!(collect_output(printer, far).await, "G0 X5.000 F1000\n");
    }

    #[tokio::test]
    async fn test_deadband_skips_imperceptible_moves() {
        let (mut printer, far) = test_printer();
        printer.move_x(0.005).await.unwrap();
        assert_eq!(printer.position(), [0.0, 0.0, 0.0]);
        assert_eq!(collect_output(printer, far).await, "");
    }

    #[tokio::test]
    async fn test_compound_move_checks_every_axis() {
        let (mut printer, far) = test_printer();
        let result = printer.move_xy(10.0, 300.0).await;
        assert!(matches!(
            result,
            Err(PrinterError::LimitExceeded {
                axis: Axis::Y,
                ..
            })
        ));
        printer.move_xy(10.0, 20.0).await.unwrap();
        assert_eq!(printer.position(), [10.0, 20.0, 0.0]);
        assert_eq!(
            collect_output(printer, far).await,
            "G0 X10.000 Y20.000\n"
        );
    }

    #[tokio::test]
    async fn test_home_resets_only_named_axes() {
        let (mut printer, far) = test_printer();
        printer.move_xyz(5.0, 6.0, 7.0).await.unwrap();
        printer.home("Z").await.unwrap();
        assert_eq!(printer.position(), [5.0, 6.0, 0.0]);
        printer.home_all().await.unwrap();
        assert_eq!(printer.position(), [0.0, 0.0, 0.0]);
        assert_eq!(
            collect_output(printer, far).await,
            "G0 X5.000 Y6.000 Z7.000\nG28 Z\nG28 X Y Z\n"
        );
    }

    #[tokio::test]
    async fn test_home_rejects_unknown_axis_letter() {
        let (mut printer, far) = test_printer();
        let result = printer.home("XQ").await;
        assert!(matches!(result, Err(PrinterError::InvalidAxis('Q'))));
        assert_eq!(collect_output(printer, far).await, "");
    }

    #[tokio::test]
    async fn test_modal_commands_update_state() {
        let (mut printer, far) = test_printer();
        printer.set_units_inch().await.unwrap();
        assert_eq!(printer.unit(), Unit::Inch);
        printer.select_plane(Plane::ZX).await.unwrap();
        assert_eq!(printer.plane(), Plane::ZX);
        printer.enable_motors("XY").await.unwrap();
        printer.disable_motors("").await.unwrap();
        assert_eq!(
            collect_output(printer, far).await,
            "G20\nG18\nM17 X Y\nM18 X Y Z\n"
        );
    }

    #[tokio::test]
    async fn test_set_speed_converts_to_mm_per_min() {
        let (mut printer, far) = test_printer();
        printer.set_speed(80.0).await.unwrap();
        assert_eq!(printer.feedrate(), 4800.0);
        let result = printer.set_speed(1.0).await;
        assert!(matches!(result, Err(PrinterError::SpeedOutOfRange { .. })));
        assert_eq!(collect_output(printer, far).await, "G0 F4800\n");
    }

    #[tokio::test]
    async fn test_arc_move_formats_radius() {
        let (mut printer, far) = test_printer();
        printer.move_arc_cw(100.0, 100.0, None, 50.0).await.unwrap();
        assert_eq!(printer.position(), [100.0, 100.0, 0.0]);
        printer
            .move_arc_ccw(120.0, 60.0, Some(20.0), 50.0)
            .await
            .unwrap();
        assert_eq!(printer.position(), [120.0, 60.0, 20.0]);
        assert_eq!(
            collect_output(printer, far).await,
            "G2 X100.000 Y100.000 R50.000\nG3 X120.000 Y60.000 Z20.000 R50.000\n"
        );
    }

    #[tokio::test]
    async fn test_hop_batches_three_legs() {
        let (mut printer, far) = test_printer();
        printer.hop(Axis::X, 50.0, 5.0).await.unwrap();
        assert_eq!(printer.position(), [50.0, 0.0, 0.0]);
        assert_eq!(
            collect_output(printer, far).await,
            "G0 Z5.000 F5000\nG0 X50.000 F5000\nG0 Z0.000 F5000\n"
        );
    }

    #[tokio::test]
    async fn test_hop_rejects_out_of_bounds_travel() {
        let (mut printer, far) = test_printer();
        let result = printer.hop(Axis::X, 500.0, 5.0).await;
        assert!(matches!(result, Err(PrinterError::LimitExceeded { .. })));
        assert_eq!(collect_output(printer, far).await, "");
    }

    #[tokio::test]
    async fn test_initialize_emits_startup_sequence() {
        let (mut printer, far) = test_printer();
        printer.initialize().await.unwrap();
        assert_eq!(printer.coordinate_mode(), CoordinateMode::Absolute);
        assert_eq!(collect_output(printer, far).await, "G90\nG0 F5000\n");
    }

    #[tokio::test]
    async fn test_get_info_collects_until_ok() {
        let (mut printer, mut far) = test_printer();
        far.write_all(b"FIRMWARE_NAME:Marlin 2.1.2\nCap:EEPROM:1\nok\n")
            .await
            .unwrap();
        let info = printer.get_info().await.unwrap();
        assert_eq!(
            info,
            vec![
                "FIRMWARE_NAME:Marlin 2.1.2".to_string(),
                "Cap:EEPROM:1".to_string(),
                "ok".to_string()
            ]
        );
        let mut request = [0u8; 5];
        far.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, b"M115\n");
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_position_unchanged() {
        let (mut printer, far) = test_printer();
        drop(far);
        let result = printer.move_x(5.0).await;
        assert!(matches!(result, Err(PrinterError::Transport(_))));
        assert_eq!(printer.position(), [0.0, 0.0, 0.0]);
    }
}
