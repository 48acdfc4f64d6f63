//! Text-command adapter family (ELM327-compatible interface chips).
//!
//! These chips only understand newline-terminated ASCII commands and answer
//! with text ending in a prompt character. This module makes one behave
//! like a generic message channel: headers are cached and re-sent only when
//! they change, received lines are filtered of adapter chatter, and frames
//! arrive as ASCII hex that is decoded, checksum-verified, and queued.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::adapter::{Adapter, DeviceCapabilities, SessionState, TimeoutScenario, VpwSpeed};
use crate::error::{Error, Result};
use crate::message::VpwMessage;
use crate::port::Port;
use crate::protocol::NODE_TOOL;

/// Prompt byte terminating every adapter response.
const PROMPT: u8 = b'>';

/// Interior delimiter between frames concatenated into one line.
const FRAME_DELIMITER: char = '<';

/// Exact affirmative acknowledgment token.
const AFFIRMATIVE: &str = "OK";

/// Transient adapter conditions that are absorbed and retried.
const BUSY_RESPONSES: [&str; 2] = ["STOPPED", "BUFFER FULL"];

/// Clone firmware revision that corrupts long VPW frames; refused outright.
const UNSUPPORTED_FIRMWARE: &str = "ELM327 v1.5";

/// Upper bound on one accumulated response line.
const RESPONSE_BUFFER_LIMIT: usize = 512;

/// Polls for an asynchronously echoed payload acknowledgment.
const SEND_POLL_ATTEMPTS: usize = 10;

/// Line reads per receive call before giving up.
const RECEIVE_ATTEMPTS: usize = 20;

/// Delay between acknowledgment polls.
const POLL_DELAY: Duration = Duration::from_millis(50);

/// Backoff after a busy/overwhelmed response line.
const BUSY_BACKOFF: Duration = Duration::from_millis(100);

/// Settle time after the reset command.
const RESET_DELAY: Duration = Duration::from_millis(250);

/// The port timeout always exceeds the adapter's own programmed timeout,
/// otherwise reads race the chip and fail intermittently.
const TIMEOUT_MARGIN: Duration = Duration::from_millis(500);

/// Fixed dialogue baud rate for this adapter family.
pub const BAUD_RATE: u32 = 115200;

fn generic_capabilities() -> DeviceCapabilities {
    DeviceCapabilities {
        max_send_size: 192,
        max_receive_size: 500,
        supports_4x: false,
    }
}

fn obdlink_capabilities() -> DeviceCapabilities {
    DeviceCapabilities {
        max_send_size: 2048,
        max_receive_size: 2048,
        supports_4x: true,
    }
}

fn allpro_capabilities() -> DeviceCapabilities {
    DeviceCapabilities {
        max_send_size: 2048,
        max_receive_size: 2048,
        supports_4x: false,
    }
}

/// What one filtered response line contained.
#[derive(Debug, Default)]
struct LineOutcome {
    frames: usize,
    affirmative_noise: bool,
}

/// Adapter driver for ELM327-compatible text-command interfaces.
pub struct ElmAdapter<P: Port> {
    port: P,
    session: SessionState,
    capabilities: DeviceCapabilities,
    queue: VecDeque<VpwMessage>,
    identity: String,
}

impl<P: Port> ElmAdapter<P> {
    /// Wrap an opened port. The adapter is unusable until `initialize`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            session: SessionState::default(),
            capabilities: generic_capabilities(),
            queue: VecDeque::new(),
            identity: String::new(),
        }
    }

    /// Identity string reported by the chip during initialization.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Read one logical response line.
    ///
    /// Accumulates bytes until the prompt or the buffer limit, maps
    /// carriage returns to spaces, drops non-printable bytes and the
    /// prompt itself, and trims the result.
    fn read_response_line(&mut self) -> Result<String> {
        let mut raw = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            self.port.receive(&mut byte)?;
            raw.push(byte[0]);
            if byte[0] == PROMPT || raw.len() >= RESPONSE_BUFFER_LIMIT {
                break;
            }
        }

        let filtered: String = raw
            .iter()
            .map(|b| if *b == b'\r' { b' ' } else { *b })
            .filter(|b| (0x20..=0x7E).contains(b) && *b != PROMPT)
            .map(char::from)
            .collect();
        let line = filtered.trim().to_string();
        trace!("adapter line: {line:?}");
        Ok(line)
    }

    /// Send one command line and read its response.
    fn send_command(&mut self, command: &str) -> Result<String> {
        trace!("adapter command: {command}");
        self.port.send(command.as_bytes())?;
        self.port.send(b"\r")?;
        self.read_response_line()
    }

    /// Send a configuration command and require an exact response.
    fn expect_exact(&mut self, command: &str, expected: &str) -> Result<()> {
        let response = self.send_command(command)?;
        if response == expected {
            Ok(())
        } else {
            Err(Error::DeviceFailure(format!(
                "{command} answered {response:?}, expected {expected:?}"
            )))
        }
    }

    /// Decode every frame segment of a filtered line into the queue.
    fn decode_frames(&mut self, line: &str) -> LineOutcome {
        let mut outcome = LineOutcome::default();
        for segment in line.split(FRAME_DELIMITER) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            match VpwMessage::from_hex(segment) {
                Ok(msg) => {
                    trace!("received frame: {msg}");
                    self.queue.push_back(msg);
                    outcome.frames += 1;
                },
                Err(Error::ChecksumMismatch { expected, actual }) => {
                    warn!(
                        "discarding frame with bad checksum \
                         (carried {expected:#04X}, computed {actual:#04X}): {segment:?}"
                    );
                },
                Err(_) if segment.ends_with(AFFIRMATIVE) => {
                    // Some chips prepend garbage to the acknowledgment.
                    // Accept it, but leave a trace of the oddity.
                    warn!("accepting noisy acknowledgment: {segment:?}");
                    outcome.affirmative_noise = true;
                },
                Err(_) => {
                    debug!("discarding unparseable segment: {segment:?}");
                },
            }
        }
        outcome
    }

    fn is_busy(line: &str) -> bool {
        BUSY_RESPONSES.iter().any(|b| line == *b)
    }

    /// Program the header the adapter will prefix to outgoing payloads.
    fn set_header(&mut self, header: [u8; 3]) -> Result<()> {
        let command = format!(
            "ATSH {:02X}{:02X}{:02X}",
            header[0], header[1], header[2]
        );
        let mut response = self.send_command(&command)?;
        if Self::is_busy(&response) {
            debug!("adapter busy during set-header, retrying once");
            thread::sleep(BUSY_BACKOFF);
            response = self.send_command(&command)?;
        }
        if response != AFFIRMATIVE {
            return Err(Error::UnexpectedResponse(format!(
                "set-header answered {response:?}"
            )));
        }
        self.session.header = Some(header);
        Ok(())
    }

    fn try_initialize(&mut self) -> Result<()> {
        self.session = SessionState::default();
        self.queue.clear();
        self.port.discard_buffers()?;

        // A benign line flushes any partial command in the chip's buffer.
        let _ = self.send_command("AT");

        let banner = self.send_command("ATZ")?;
        debug!("reset banner: {banner:?}");
        thread::sleep(RESET_DELAY);

        // The echo of this very command is still on; accept a trailing OK.
        let echo_off = self.send_command("ATE0")?;
        if !echo_off.ends_with(AFFIRMATIVE) {
            return Err(Error::DeviceFailure(format!(
                "ATE0 answered {echo_off:?}"
            )));
        }
        self.expect_exact("ATS0", AFFIRMATIVE)?;

        // Three identification probes: two AT-family, one vendor-specific.
        let elm_id = self.send_command("ATI")?;
        let description = self.send_command("AT@1")?;
        let vendor_id = self.send_command("STI")?;
        debug!("identity probes: {elm_id:?} / {description:?} / {vendor_id:?}");

        for id in [&elm_id, &description, &vendor_id] {
            if id.contains(UNSUPPORTED_FIRMWARE) {
                return Err(Error::DeviceFailure(format!(
                    "unsupported adapter firmware: {id}"
                )));
            }
        }

        if vendor_id.starts_with("STN") {
            self.capabilities = obdlink_capabilities();
            self.identity = vendor_id;
        } else if description.contains("All Pro") {
            self.capabilities = allpro_capabilities();
            self.identity = description;
        } else {
            self.capabilities = generic_capabilities();
            self.identity = elm_id;
        }

        self.expect_exact("ATAL", AFFIRMATIVE)?;
        self.expect_exact("ATSP2", AFFIRMATIVE)?;
        self.expect_exact("ATDPN", "2")?;
        self.expect_exact("ATAR", AFFIRMATIVE)?;
        self.expect_exact("ATAT0", AFFIRMATIVE)?;
        self.expect_exact(&format!("ATSR {NODE_TOOL:02X}"), AFFIRMATIVE)?;
        self.expect_exact("ATH1", AFFIRMATIVE)?;

        self.set_timeout(TimeoutScenario::Initialization)?;
        debug!("adapter initialized: {}", self.identity);
        Ok(())
    }
}

impl<P: Port> Adapter for ElmAdapter<P> {
    fn initialize(&mut self) -> Result<()> {
        self.try_initialize().map_err(|e| match e {
            Error::DeviceFailure(_) => e,
            other => Error::DeviceFailure(format!("adapter initialization failed: {other}")),
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) -> Result<()> {
        if self.session.scenario == scenario {
            return Ok(());
        }
        let ms = scenario.milliseconds();
        self.port
            .set_timeout(Duration::from_millis(ms) + TIMEOUT_MARGIN)?;

        // The register counts in 4 ms units and only holds 1..=255.
        let register = (ms / 4).clamp(1, 255);
        self.expect_exact(&format!("ATST {register:02X}"), AFFIRMATIVE)?;
        self.session.scenario = scenario;
        Ok(())
    }

    fn send_message(&mut self, msg: &VpwMessage) -> Result<()> {
        let header = msg.header();
        if self.session.header != Some(header) {
            self.set_header(header)?;
        }

        let mut response = match self.send_command(&msg.payload_hex()) {
            Ok(line) => line,
            Err(Error::Timeout(_)) => String::new(),
            Err(e) => return Err(e),
        };

        // Some adapters echo the acknowledgment asynchronously.
        let mut polls = 0;
        while response.is_empty() && polls < SEND_POLL_ATTEMPTS {
            thread::sleep(POLL_DELAY);
            response = match self.read_response_line() {
                Ok(line) => line,
                Err(Error::Timeout(_)) => String::new(),
                Err(e) => return Err(e),
            };
            polls += 1;
        }

        if response == AFFIRMATIVE {
            return Ok(());
        }
        let outcome = self.decode_frames(&response);
        if outcome.frames > 0 || outcome.affirmative_noise {
            return Ok(());
        }
        if response.ends_with(AFFIRMATIVE) {
            warn!("accepting unclean send acknowledgment: {response:?}");
            return Ok(());
        }
        Err(Error::UnexpectedResponse(format!(
            "send answered {response:?}"
        )))
    }

    fn receive_message(&mut self) -> Result<VpwMessage> {
        if let Some(msg) = self.queue.pop_front() {
            return Ok(msg);
        }

        for attempt in 1..=RECEIVE_ATTEMPTS {
            let line = self.read_response_line()?;
            if line.is_empty() {
                continue;
            }
            if Self::is_busy(&line) {
                debug!("adapter busy ({line}), attempt {attempt}/{RECEIVE_ATTEMPTS}");
                thread::sleep(BUSY_BACKOFF);
                continue;
            }
            if self.decode_frames(&line).frames > 0 {
                break;
            }
        }

        self.queue.pop_front().ok_or_else(|| {
            Error::Timeout(format!("no frame within {RECEIVE_ATTEMPTS} lines"))
        })
    }

    fn clear_message_buffer(&mut self) -> Result<()> {
        self.queue.clear();
        self.port.discard_buffers()
    }

    fn set_vpw_speed(&mut self, speed: VpwSpeed) -> Result<()> {
        if self.session.speed == speed {
            return Ok(());
        }
        if speed == VpwSpeed::FourX && !self.capabilities.supports_4x {
            return Err(Error::Unsupported(format!(
                "{} cannot follow the bus into 4x mode",
                self.identity
            )));
        }
        let command = match speed {
            VpwSpeed::Standard => "STVPW1",
            VpwSpeed::FourX => "STVPW4",
        };
        self.expect_exact(command, AFFIRMATIVE)?;
        self.session.speed = speed;
        Ok(())
    }
}

#[cfg(feature = "native")]
impl ElmAdapter<crate::port::NativePort> {
    /// Open the named serial port at this family's fixed baud rate.
    pub fn open(port_name: &str) -> Result<Self> {
        let config = crate::port::SerialConfig::new(port_name, BAUD_RATE)
            .with_timeout(Duration::from_millis(1000));
        Ok(Self::new(crate::port::NativePort::open(&config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NODE_PCM, PRIORITY_PHYSICAL};

    /// Scripted port: reads come from a queue, writes are recorded.
    struct MockPort {
        read: VecDeque<u8>,
        written: Vec<u8>,
        timeout: Duration,
    }

    impl MockPort {
        fn new() -> Self {
            Self {
                read: VecDeque::new(),
                written: Vec::new(),
                timeout: Duration::from_millis(1000),
            }
        }

        /// Queue adapter responses, each terminated by the prompt.
        fn script(responses: &[&str]) -> Self {
            let mut port = Self::new();
            for response in responses {
                port.read.extend(response.bytes());
                port.read.push_back(b'\r');
                port.read.push_back(PROMPT);
            }
            port
        }

        fn written_text(&self) -> String {
            String::from_utf8_lossy(&self.written).into_owned()
        }

        fn count_commands(&self, prefix: &str) -> usize {
            self.written_text()
                .split('\r')
                .filter(|cmd| cmd.starts_with(prefix))
                .count()
        }
    }

    impl Port for MockPort {
        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.read.pop_front() {
                Some(b) => {
                    buf[0] = b;
                    Ok(1)
                },
                None => Err(Error::Timeout("script exhausted".into())),
            }
        }

        fn discard_buffers(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = timeout;
            Ok(())
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn init_script(elm_id: &str, description: &str, vendor_id: &str) -> Vec<String> {
        [
            "?",          // benign flush line
            "ELM327 v1.4b", // ATZ banner
            "ATE0 OK",    // echo still on for this one
            "OK",         // ATS0
            elm_id,       // ATI
            description,  // AT@1
            vendor_id,    // STI
            "OK",         // ATAL
            "OK",         // ATSP2
            "2",          // ATDPN
            "OK",         // ATAR
            "OK",         // ATAT0
            "OK",         // ATSR F0
            "OK",         // ATH1
            "OK",         // ATST
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    fn initialized_adapter(responses: &[&str]) -> ElmAdapter<MockPort> {
        let script: Vec<String> = init_script("ELM327 v1.4b", "OBDII to RS232 Interpreter", "?")
            .into_iter()
            .chain(responses.iter().map(ToString::to_string))
            .collect();
        let refs: Vec<&str> = script.iter().map(String::as_str).collect();
        let mut adapter = ElmAdapter::new(MockPort::script(&refs));
        adapter.initialize().unwrap();
        adapter
    }

    #[test]
    fn test_response_line_filtering() {
        // "OK" + CR + prompt decodes to exactly "OK".
        let mut adapter = ElmAdapter::new(MockPort::new());
        adapter.port.read.extend([0x4F, 0x4B, 0x0D, 0x3E]);
        assert_eq!(adapter.read_response_line().unwrap(), "OK");
    }

    #[test]
    fn test_response_line_drops_control_bytes() {
        let mut adapter = ElmAdapter::new(MockPort::new());
        adapter
            .port
            .read
            .extend([0x02, b'4', b'1', 0x07, b'F', 0x0D, b'K', PROMPT]);
        assert_eq!(adapter.read_response_line().unwrap(), "41F K");
    }

    #[test]
    fn test_initialize_generic_elm() {
        let script = init_script("ELM327 v1.4b", "OBDII to RS232 Interpreter", "?");
        let refs: Vec<&str> = script.iter().map(String::as_str).collect();
        let mut adapter = ElmAdapter::new(MockPort::script(&refs));

        adapter.initialize().unwrap();
        assert_eq!(adapter.identity(), "ELM327 v1.4b");
        assert_eq!(adapter.capabilities(), generic_capabilities());
        assert_eq!(adapter.session.scenario, TimeoutScenario::Initialization);

        let written = adapter.port.written_text();
        assert!(written.contains("ATSP2\r"));
        assert!(written.contains("ATSR F0\r"));
        assert!(written.contains("ATST 7D\r")); // 500 ms / 4
    }

    #[test]
    fn test_initialize_detects_obdlink() {
        let script = init_script("ELM327 v1.3a", "OBDLink SX", "STN1110 v4.0.1");
        let refs: Vec<&str> = script.iter().map(String::as_str).collect();
        let mut adapter = ElmAdapter::new(MockPort::script(&refs));

        adapter.initialize().unwrap();
        assert_eq!(adapter.identity(), "STN1110 v4.0.1");
        assert!(adapter.capabilities().supports_4x);
    }

    #[test]
    fn test_initialize_rejects_unsupported_firmware() {
        // Probes answer, then classification refuses the clone before any
        // protocol-configuration command goes out.
        let script = [
            "?",
            "ELM327 v1.5",
            "ATE0 OK",
            "OK",
            "ELM327 v1.5",
            "OBDII to RS232 Interpreter",
            "?",
        ];
        let mut adapter = ElmAdapter::new(MockPort::script(&script));

        assert!(matches!(
            adapter.initialize(),
            Err(Error::DeviceFailure(_))
        ));
        let written = adapter.port.written_text();
        assert!(!written.contains("ATAL"));
        assert!(!written.contains("ATSP2"));
    }

    #[test]
    fn test_initialize_aborts_on_wrong_protocol_confirmation() {
        let mut script = init_script("ELM327 v1.4b", "OBDII to RS232 Interpreter", "?");
        script[9] = "5".into(); // ATDPN reports the wrong protocol
        let refs: Vec<&str> = script.iter().map(String::as_str).collect();
        let mut adapter = ElmAdapter::new(MockPort::script(&refs));

        assert!(matches!(
            adapter.initialize(),
            Err(Error::DeviceFailure(_))
        ));
    }

    #[test]
    fn test_set_timeout_is_idempotent() {
        let mut adapter = initialized_adapter(&["OK"]);
        adapter.set_timeout(TimeoutScenario::DataProperty).unwrap();
        let reprograms = adapter.port.count_commands("ATST");
        adapter.set_timeout(TimeoutScenario::DataProperty).unwrap();

        assert_eq!(adapter.port.count_commands("ATST"), reprograms);
        assert_eq!(reprograms, 2); // one during init, one for the change
    }

    #[test]
    fn test_set_timeout_programs_clamped_register() {
        let mut adapter = initialized_adapter(&["OK"]);
        adapter.set_timeout(TimeoutScenario::BlockTransfer).unwrap();
        // 2500 ms / 4 = 625, clamped to the register ceiling of 255.
        assert!(adapter.port.written_text().contains("ATST FF\r"));
        assert!(adapter.port.timeout > Duration::from_millis(2500));
    }

    #[test]
    fn test_send_message_caches_header() {
        let mut adapter = initialized_adapter(&["OK", "OK", "OK"]);
        let msg = VpwMessage::new(PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL, &[0x3C, 0x0A]);

        adapter.send_message(&msg).unwrap();
        adapter.send_message(&msg).unwrap();

        assert_eq!(adapter.port.count_commands("ATSH"), 1);
        assert_eq!(adapter.port.count_commands("3C0A"), 2);
    }

    #[test]
    fn test_send_message_retries_set_header_once_on_busy() {
        let mut adapter = initialized_adapter(&["STOPPED", "OK", "OK"]);
        let msg = VpwMessage::new(PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL, &[0x3C, 0x0A]);

        adapter.send_message(&msg).unwrap();
        assert_eq!(adapter.port.count_commands("ATSH"), 2);
    }

    #[test]
    fn test_send_message_queues_immediate_reply_frames() {
        let reply = VpwMessage::new(PRIORITY_PHYSICAL, NODE_TOOL, NODE_PCM, &[0x7C, 0x0A, 0x01]);
        let reply_hex = reply.to_hex();
        let mut adapter = initialized_adapter(&["OK", &reply_hex]);
        let msg = VpwMessage::new(PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL, &[0x3C, 0x0A]);

        adapter.send_message(&msg).unwrap();
        assert_eq!(adapter.receive_message().unwrap(), reply);
    }

    #[test]
    fn test_send_message_rejects_garbage() {
        let mut adapter = initialized_adapter(&["OK", "CAN ERROR"]);
        let msg = VpwMessage::new(PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL, &[0x3C, 0x0A]);

        assert!(matches!(
            adapter.send_message(&msg),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_send_message_tolerates_noisy_affirmative() {
        let mut adapter = initialized_adapter(&["OK", "62 OK"]);
        let msg = VpwMessage::new(PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL, &[0x3C, 0x0A]);

        adapter.send_message(&msg).unwrap();
    }

    #[test]
    fn test_receive_splits_multi_frame_line() {
        // Two frames joined by the interior delimiter in one line.
        let mut adapter = initialized_adapter(&["6C10F0016D<6C10F0026E"]);

        let first = adapter.receive_message().unwrap();
        let second = adapter.receive_message().unwrap();
        assert_eq!(first.as_bytes(), &[0x6C, 0x10, 0xF0, 0x01]);
        assert_eq!(second.as_bytes(), &[0x6C, 0x10, 0xF0, 0x02]);
    }

    #[test]
    fn test_receive_skips_busy_lines() {
        let reply = VpwMessage::new(PRIORITY_PHYSICAL, NODE_TOOL, NODE_PCM, &[0x7C, 0x01]);
        let reply_hex = reply.to_hex();
        let mut adapter = initialized_adapter(&["BUFFER FULL", &reply_hex]);

        assert_eq!(adapter.receive_message().unwrap(), reply);
    }

    #[test]
    fn test_receive_discards_garbage_and_continues() {
        let reply = VpwMessage::new(PRIORITY_PHYSICAL, NODE_TOOL, NODE_PCM, &[0x7C, 0x01]);
        let reply_hex = reply.to_hex();
        let mut adapter = initialized_adapter(&["SEARCHING...", &reply_hex]);

        assert_eq!(adapter.receive_message().unwrap(), reply);
    }

    #[test]
    fn test_receive_times_out_cleanly() {
        let mut adapter = initialized_adapter(&[]);
        assert!(matches!(
            adapter.receive_message(),
            Err(Error::Timeout(_))
        ));
    }

    #[test]
    fn test_speed_change_requires_capability() {
        let mut adapter = initialized_adapter(&[]);
        assert!(matches!(
            adapter.set_vpw_speed(VpwSpeed::FourX),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_speed_change_on_capable_adapter() {
        let script: Vec<String> = init_script("ELM327 v1.3a", "OBDLink SX", "STN1110 v4.0.1")
            .into_iter()
            .chain(["OK".to_string()])
            .collect();
        let refs: Vec<&str> = script.iter().map(String::as_str).collect();
        let mut adapter = ElmAdapter::new(MockPort::script(&refs));
        adapter.initialize().unwrap();

        adapter.set_vpw_speed(VpwSpeed::FourX).unwrap();
        assert_eq!(adapter.session.speed, VpwSpeed::FourX);
        assert!(adapter.port.written_text().contains("STVPW4\r"));
    }
}
