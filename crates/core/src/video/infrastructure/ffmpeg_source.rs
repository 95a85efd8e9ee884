use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use crate::shared::frame::{Frame, RGB_BYTES};
use crate::shared::stream_locator::StreamLocator;
use crate::video::domain::video_source::{
    ReadError, SourceConfig, SourceError, VideoSource, VideoStream,
};

/// Opens RTMP streams via ffmpeg-next (libavformat + libavcodec).
///
/// libavformat has no separate connect timeout for every protocol, so the
/// open call runs on a helper thread and is abandoned once
/// `open_timeout` passes. An abandoned connection is dropped by the helper
/// when it eventually returns.
pub struct FfmpegSource;

impl FfmpegSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for FfmpegSource {
    fn open(
        &self,
        locator: &StreamLocator,
        config: &SourceConfig,
    ) -> Result<Box<dyn VideoStream>, SourceError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let url = locator.as_str().to_string();
        let options = config.clone();

        thread::Builder::new()
            .name("ffmpeg-open".into())
            .spawn(move || {
                let _ = tx.send(FfmpegStream::connect(&url, &options));
            })
            .map_err(|e| SourceError::Open {
                locator: locator.to_string(),
                reason: e.to_string(),
            })?;

        match rx.recv_timeout(config.open_timeout) {
            Ok(Ok(stream)) => {
                log::info!("Opened stream {locator}");
                Ok(Box::new(stream))
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Err(SourceError::OpenTimeout(config.open_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Open {
                locator: locator.to_string(),
                reason: "open worker exited without a result".into(),
            }),
        }
    }
}

struct ScalerState {
    context: scaling::Context,
    format: Pixel,
    width: u32,
    height: u32,
}

struct Connection {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<ScalerState>,
    video_stream_index: usize,
}

/// A live demux + decode session on one stream.
pub struct FfmpegStream {
    connection: Option<Connection>,
    read_timeout: Duration,
    /// New packet reads may only begin this long into a `read` call.
    read_window: Duration,
    frame_index: usize,
}

/// Portion of the read timeout one blocking packet read may use.
const PACKET_TIMEOUT_DIVISOR: u32 = 4;

/// Splits a read timeout into the window for starting packet reads and
/// the limit on each packet read. The two add up to at most `total`
/// (given a timeout of at least a few milliseconds).
fn read_budget(total: Duration) -> (Duration, Duration) {
    let packet = (total / PACKET_TIMEOUT_DIVISOR).max(Duration::from_millis(1));
    (total.saturating_sub(packet), packet)
}

// Safety: an FfmpegStream is moved from the open helper to the capture
// thread once and only ever used from one thread at a time afterwards.
// The raw pointers inside ffmpeg types are never shared.
unsafe impl Send for FfmpegStream {}

impl FfmpegStream {
    fn connect(url: &str, config: &SourceConfig) -> Result<Self, SourceError> {
        let open_error = |reason: String| SourceError::Open {
            locator: url.to_string(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_error(e.to_string()))?;

        let (read_window, packet_timeout) = read_budget(config.read_timeout);
        let mut options = ffmpeg_next::Dictionary::new();
        options.set("rw_timeout", &packet_timeout.as_micros().to_string());
        options.set("rtsp_transport", config.transport.as_str());
        options.set("buffer_size", &config.buffer_size.to_string());

        let input = ffmpeg_next::format::input_with_dictionary(url, options)
            .map_err(|e| open_error(e.to_string()))?;

        let (video_stream_index, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or_else(|| SourceError::NoVideoStream(url.to_string()))?;
            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| open_error(e.to_string()))?;
            let decoder = codec_ctx
                .decoder()
                .video()
                .map_err(|e| open_error(e.to_string()))?;
            (stream.index(), decoder)
        };

        log::debug!(
            "Stream {url}: video stream #{video_stream_index}, {}x{}",
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            connection: Some(Connection {
                input,
                decoder,
                scaler: None,
                video_stream_index,
            }),
            read_timeout: config.read_timeout,
            read_window,
            frame_index: 0,
        })
    }
}

impl Connection {
    /// Pulls one decoded picture out of the decoder if it has one ready.
    fn try_receive(&mut self, index: usize) -> Result<Option<Frame>, ReadError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Ok(Some(Frame::empty(index)));
        }

        let format = decoded.format();
        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.format != format || s.width != width || s.height != height);
        if stale {
            let context = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| ReadError::Decode(e.to_string()))?;
            self.scaler = Some(ScalerState {
                context,
                format,
                width,
                height,
            });
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(None);
        };
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler
            .context
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| ReadError::Decode(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        Ok(Some(Frame::new(pixels, width, height, index)))
    }
}

impl VideoStream for FfmpegStream {
    fn read(&mut self) -> Result<Frame, ReadError> {
        let deadline = Instant::now() + self.read_window;
        let index = self.frame_index;
        let Some(conn) = self.connection.as_mut() else {
            return Err(ReadError::Released);
        };

        loop {
            if let Some(frame) = conn.try_receive(index)? {
                self.frame_index += 1;
                return Ok(frame);
            }
            if Instant::now() >= deadline {
                return Err(ReadError::Timeout(self.read_timeout));
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut conn.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Err(ReadError::EndOfStream),
                Err(e) => return Err(ReadError::Decode(e.to_string())),
            }

            if packet.stream() != conn.video_stream_index {
                continue;
            }
            if let Err(e) = conn.decoder.send_packet(&packet) {
                log::debug!("Decoder rejected packet: {e}");
            }
        }
    }

    fn release(&mut self) {
        if self.connection.take().is_some() {
            log::debug!("Released stream after {} frames", self.frame_index);
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Packs the scaled RGB plane row by row, dropping ffmpeg's line padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let row_len = width as usize * RGB_BYTES;
    rgb_frame
        .data(0)
        .chunks(stride)
        .take(height as usize)
        .flat_map(|row| &row[..row_len])
        .copied()
        .collect()
}
