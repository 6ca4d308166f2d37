//! Poll a Growatt 1500 over serial and log qualified readings to monthly
//! CSV files.
//!
//! Runs forever. At night the inverter stops answering entirely; the loop
//! re-tries the handshake once a minute until the sun comes back.

use std::env;

use growatt_1500::inverter::GrowattInverter;
use growatt_1500::limiter::RateLimiter;
use growatt_1500::storage::MonthlyLog;
use inquire::Select;
use serialport::SerialPort;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// The read timeout doubles as end-of-session detection: once the inverter
// goes quiet for this long the session is considered over.
const SERIAL_TIMEOUT_MS: u64 = 5000;
// How long to wait before retrying the handshake against a silent inverter.
const RETRY_DELAY_S: u64 = 60;
// Where the monthly log files are written.
const DATA_DIR: &str = ".";

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

fn wait_for_retry() {
    std::thread::sleep(std::time::Duration::from_secs(RETRY_DELAY_S));
}

fn main() {
    env_logger::init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    log::info!("using port {port_name}");

    let port = serialport::new(&port_name, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let mut inverter = GrowattInverter::new(PortWrapper(port));
    let store = MonthlyLog::new(DATA_DIR);

    loop {
        // Ask the inverter for a session. While it sleeps (sunset to
        // sunrise) this simply stays silent, so retry on a slow clock.
        match inverter.start_session() {
            Ok(true) => log::info!("inverter answered, starting session"),
            Ok(false) => {
                log::debug!("inverter silent, retrying in {RETRY_DELAY_S} s");
                wait_for_retry();
                continue;
            }
            Err(e) => {
                log::error!("session request failed: {e}");
                wait_for_retry();
                continue;
            }
        }

        if let Err(e) = inverter.request_interval_data() {
            log::error!("interval data request failed: {e}");
            wait_for_retry();
            continue;
        }

        // One rate limiter per session; the first reading always logs.
        let mut limiter = RateLimiter::default();
        loop {
            match inverter.next_reading() {
                Ok(Some(reading)) => {
                    if !limiter.permit(reading.sample_time) {
                        continue;
                    }
                    if let Err(e) = store.append(&reading) {
                        log::error!("failed to log reading: {e}");
                    }
                }
                Ok(None) => {
                    log::info!(
                        "session over ({} noise bytes dropped so far)",
                        inverter.discarded_bytes()
                    );
                    break;
                }
                Err(e) => {
                    log::error!("session aborted: {e}");
                    break;
                }
            }
        }
    }
}
