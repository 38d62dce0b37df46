use anyhow::{anyhow, bail, Context, Result};
use libloading::Library;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::ffi::CString;
use std::os::raw::{c_char, c_double, c_int};
use crate::drivers::{AcquisitionError, SignalBuffer, SignalWindow, StreamReceiver};
pub const BRAINFLOW_DEVICE_NAME: &str = "openbci";
const BOARD_ID_CYTON_DAISY: c_int = 2;
const PRESET_DEFAULT: c_int = 0;
const STREAM_RINGBUF_PACKETS: c_int = 450_000;
#[derive(Serialize)]
struct BrainFlowInputParams {
    serial_port: String,
    mac_address: String,
    ip_address: String,
    ip_address_aux: String,
    ip_address_anc: String,
    ip_port: i32,
    ip_port_aux: i32,
    ip_port_anc: i32,
    ip_protocol: i32,
    other_info: String,
    timeout: i32,
    serial_number: String,
    file: String,
    file_aux: String,
    file_anc: String,
    master_board: i32,
}
impl BrainFlowInputParams {
    fn for_serial(port: &str) -> Self {
        Self {
            serial_port: port.to_string(),
            mac_address: String::new(),
            ip_address: String::new(),
            ip_address_aux: String::new(),
            ip_address_anc: String::new(),
            ip_port: 0,
            ip_port_aux: 0,
            ip_port_anc: 0,
            ip_protocol: 0,
            other_info: String::new(),
            timeout: 0,
            serial_number: String::new(),
            file: String::new(),
            file_aux: String::new(),
            file_anc: String::new(),
            master_board: -100, // NO_BOARD
        }
    }
}
#[cfg(windows)]
const LIBRARY_NAME: &str = "BoardController.dll";
#[cfg(target_os = "macos")]
const LIBRARY_NAME: &str = "libBoardController.dylib";
#[cfg(all(unix, not(target_os = "macos")))]
const LIBRARY_NAME: &str = "libBoardController.so";
struct BrainFlowApi {
    #[allow(dead_code)]
    lib: Library,
    prepare_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    start_stream: unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char) -> c_int,
    stop_stream: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    release_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    get_sampling_rate: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_num_rows: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_eeg_channels: unsafe extern "C" fn(c_int, c_int, *mut c_int, *mut c_int) -> c_int,
    get_timestamp_channel: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_board_data_count: unsafe extern "C" fn(c_int, *mut c_int, c_int, *const c_char) -> c_int,
    get_board_data:
        unsafe extern "C" fn(c_int, c_int, *mut c_double, c_int, *const c_char) -> c_int,
}
impl BrainFlowApi {
    fn load() -> Result<Self> {
        // BoardController must sit next to the executable or on the loader path.
        let lib = unsafe { Library::new(LIBRARY_NAME) }
            .with_context(|| format!("{LIBRARY_NAME} not found in working directory"))?;
        // Safety: signatures follow the BrainFlow C API of the official package.
        unsafe {
            Ok(Self {
                prepare_session: *lib.get(b"prepare_session\0")?,
                start_stream: *lib.get(b"start_stream\0")?,
                stop_stream: *lib.get(b"stop_stream\0")?,
                release_session: *lib.get(b"release_session\0")?,
                get_sampling_rate: *lib.get(b"get_sampling_rate\0")?,
                get_num_rows: *lib.get(b"get_num_rows\0")?,
                get_eeg_channels: *lib.get(b"get_eeg_channels\0")?,
                get_timestamp_channel: *lib.get(b"get_timestamp_channel\0")?,
                get_board_data_count: *lib.get(b"get_board_data_count\0")?,
                get_board_data: *lib.get(b"get_board_data\0")?,
                lib,
            })
        }
    }
    fn instance() -> Result<&'static BrainFlowApi> {
        static API: OnceCell<BrainFlowApi> = OnceCell::new();
        API.get_or_try_init(Self::load)
    }
    fn check(code: c_int, ctx: &str) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(anyhow!("{ctx} failed (BrainFlow code {code})"))
        }
    }
    fn prepare(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.prepare_session)(board_id, input.as_ptr()) },
            "prepare_session",
        )
    }
    fn start_stream(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe {
                (self.start_stream)(
                    STREAM_RINGBUF_PACKETS,
                    std::ptr::null(),
                    board_id,
                    input.as_ptr(),
                )
            },
            "start_stream",
        )
    }
    fn stop_stream(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.stop_stream)(board_id, input.as_ptr()) },
            "stop_stream",
        )
    }
    fn release(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.release_session)(board_id, input.as_ptr()) },
            "release_session",
        )
    }
    fn sampling_rate(&self, board_id: c_int) -> Result<c_int> {
        let mut rate: c_int = 0;
        Self::check(
            unsafe { (self.get_sampling_rate)(board_id, PRESET_DEFAULT, &mut rate as *mut c_int) },
            "get_sampling_rate",
        )?;
        Ok(rate)
    }
    fn num_rows(&self, board_id: c_int) -> Result<c_int> {
        let mut rows: c_int = 0;
        Self::check(
            unsafe { (self.get_num_rows)(board_id, PRESET_DEFAULT, &mut rows as *mut c_int) },
            "get_num_rows",
        )?;
        Ok(rows)
    }
    fn timestamp_row(&self, board_id: c_int) -> Result<c_int> {
        let mut row: c_int = 0;
        Self::check(
            unsafe {
                (self.get_timestamp_channel)(board_id, PRESET_DEFAULT, &mut row as *mut c_int)
            },
            "get_timestamp_channel",
        )?;
        Ok(row)
    }
    fn eeg_channels(&self, board_id: c_int, max_channels: usize) -> Result<Vec<c_int>> {
        let mut out_len: c_int = 0;
        let mut buf = vec![0 as c_int; max_channels.max(32)];
        Self::check(
            unsafe {
                (self.get_eeg_channels)(
                    board_id,
                    PRESET_DEFAULT,
                    buf.as_mut_ptr(),
                    &mut out_len as *mut c_int,
                )
            },
            "get_eeg_channels",
        )?;
        buf.truncate(out_len as usize);
        Ok(buf)
    }
    fn data_count(&self, board_id: c_int, input: &CString) -> Result<usize> {
        let mut count: c_int = 0;
        Self::check(
            unsafe {
                (self.get_board_data_count)(
                    PRESET_DEFAULT,
                    &mut count as *mut c_int,
                    board_id,
                    input.as_ptr(),
                )
            },
            "get_board_data_count",
        )?;
        Ok(count.max(0) as usize)
    }
    /// Drains `num_samples` columns from the board ring buffer into `buffer`
    /// (row-major, `num_rows x num_samples`).
    fn drain(
        &self,
        board_id: c_int,
        input: &CString,
        num_samples: usize,
        buffer: &mut [f64],
    ) -> Result<()> {
        Self::check(
            unsafe {
                (self.get_board_data)(
                    num_samples as c_int,
                    PRESET_DEFAULT,
                    buffer.as_mut_ptr(),
                    board_id,
                    input.as_ptr(),
                )
            },
            "get_board_data",
        )
    }
}
// 板卡数据行布局 (get_board_data 的行号)
#[derive(Debug, PartialEq)]
struct BoardRows {
    num_rows: usize,
    timestamp_row: usize,
    eeg_channels: Vec<usize>,
}
impl BoardRows {
    /// Checks the row indices reported by the board against its row count.
    /// EEG rows outside the table are dropped; a bad timestamp row is fatal.
    fn new(num_rows: c_int, timestamp_row: c_int, eeg_channels: Vec<c_int>) -> Result<Self> {
        let num_rows = usize::try_from(num_rows)
            .map_err(|_| anyhow!("BrainFlow reported {num_rows} data rows"))?;
        let timestamp_row = usize::try_from(timestamp_row)
            .ok()
            .filter(|&row| row < num_rows)
            .ok_or_else(|| {
                anyhow!("BrainFlow timestamp row {timestamp_row} outside {num_rows} data rows")
            })?;
        let eeg_channels: Vec<usize> = eeg_channels
            .into_iter()
            .filter_map(|ch| usize::try_from(ch).ok())
            .filter(|&ch| ch < num_rows && ch != timestamp_row)
            .collect();
        if eeg_channels.is_empty() {
            bail!("BrainFlow board reports no EEG rows");
        }
        Ok(Self {
            num_rows,
            timestamp_row,
            eeg_channels,
        })
    }
}
/// BrainFlow-backed receiver for OpenBCI Cyton + Daisy via USB dongle.
///
/// `acquire` drains whatever the board has buffered since the previous call
/// and never waits for more.
pub struct BrainFlowSource {
    port_name: String,
    api: &'static BrainFlowApi,
    input_json: CString,
    eeg_channels: Vec<usize>,
    timestamp_row: usize,
    num_rows: usize,
    buffer: SignalBuffer,
    window_samples: usize,
    is_streaming: bool,
    released: bool,
}
impl BrainFlowSource {
    /// Prepares a BrainFlow session for Cyton+Daisy (board id 2) and starts streaming.
    pub fn connect(port_name: &str, window_sec: f64, buffer_sec: f64) -> Result<Self> {
        let api = BrainFlowApi::instance()?;
        let params = BrainFlowInputParams::for_serial(port_name);
        let json = serde_json::to_string(&params)?;
        let input_json =
            CString::new(json).context("failed to encode BrainFlow input params to C string")?;
        api.prepare(BOARD_ID_CYTON_DAISY, &input_json)?;
        let described = api.sampling_rate(BOARD_ID_CYTON_DAISY).and_then(|rate| {
            let num_rows = api.num_rows(BOARD_ID_CYTON_DAISY)?;
            let rows = BoardRows::new(
                num_rows,
                api.timestamp_row(BOARD_ID_CYTON_DAISY)?,
                api.eeg_channels(BOARD_ID_CYTON_DAISY, num_rows.max(0) as usize)?,
            )?;
            Ok((rate as f64, rows))
        });
        let (sample_rate_hz, rows) = match described {
            Ok(described) => described,
            Err(e) => {
                if let Err(release) = api.release(BOARD_ID_CYTON_DAISY, &input_json) {
                    warn!("failed to release BrainFlow session: {release:#}");
                }
                return Err(e);
            }
        };
        let BoardRows {
            num_rows,
            timestamp_row,
            eeg_channels,
        } = rows;
        let labels = (1..=eeg_channels.len()).map(|i| format!("EEG{i}")).collect();
        let buffer = SignalBuffer::with_history_seconds(
            labels,
            sample_rate_hz,
            buffer_sec.max(window_sec),
        )?;
        let mut source = Self {
            port_name: port_name.to_string(),
            api,
            input_json,
            eeg_channels,
            timestamp_row,
            num_rows,
            buffer,
            window_samples: (window_sec * sample_rate_hz).ceil() as usize,
            is_streaming: false,
            released: false,
        };
        source.start_stream()?;
        info!(
            "BrainFlow session on {} ready: {} Hz, {} EEG channels",
            source.port_name,
            sample_rate_hz,
            source.eeg_channels.len()
        );
        Ok(source)
    }
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
    fn start_stream(&mut self) -> Result<()> {
        if !self.is_streaming {
            self.api
                .start_stream(BOARD_ID_CYTON_DAISY, &self.input_json)?;
            self.is_streaming = true;
        }
        Ok(())
    }
    pub fn stop_stream(&mut self) -> Result<()> {
        if !self.released {
            if self.is_streaming {
                self.api
                    .stop_stream(BOARD_ID_CYTON_DAISY, &self.input_json)?;
                self.is_streaming = false;
            }
            self.api.release(BOARD_ID_CYTON_DAISY, &self.input_json)?;
            self.released = true;
        }
        Ok(())
    }
    fn pull(&mut self) -> Result<()> {
        let available = self.api.data_count(BOARD_ID_CYTON_DAISY, &self.input_json)?;
        if available == 0 {
            return Ok(());
        }
        let mut raw = vec![0.0f64; self.num_rows * available];
        self.api
            .drain(BOARD_ID_CYTON_DAISY, &self.input_json, available, &mut raw)?;
        let row = |r: usize| raw[r * available..(r + 1) * available].to_vec();
        let columns: Vec<Vec<f64>> = self.eeg_channels.iter().map(|&ch| row(ch)).collect();
        let timestamps = row(self.timestamp_row);
        debug!("drained {available} samples from {}", self.port_name);
        self.buffer.push_columns(&columns, &timestamps);
        Ok(())
    }
}
impl StreamReceiver for BrainFlowSource {
    fn acquire(&mut self) -> Result<(), AcquisitionError> {
        Ok(self.pull()?)
    }
    fn get_window(&self) -> Result<SignalWindow, AcquisitionError> {
        Ok(self.buffer.window(self.window_samples))
    }
    fn sample_rate(&self) -> f64 {
        self.buffer.sample_rate_hz()
    }
    fn trigger_channel(&self) -> Option<usize> {
        None
    }
    fn channel_labels(&self) -> &[String] {
        self.buffer.channel_labels()
    }
}
impl Drop for BrainFlowSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop_stream() {
            warn!("failed to release BrainFlow session: {e:#}");
        }
    }
}
