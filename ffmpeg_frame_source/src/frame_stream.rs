use std::{
    io::{self, Read},
    process::{Child, ChildStdout, Command, Stdio},
    thread::JoinHandle,
    time::Duration,
};

use image::GrayImage;
use log::warn;
use wait_timeout::ChildExt;

use crate::ExtractError;

//How long to wait for ffmpeg to exit once its stdout has closed, before
//killing it outright.
const REAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for opening a [`FrameStream`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStreamCfg {
    /// Frames to sample per second of video time. Selection is performed by
    /// ffmpeg's `fps` filter, which works from presentation timestamps and so
    /// needs no duration metadata from the container.
    pub sample_rate: f64,

    /// Side length of the emitted square luminance planes, in pixels.
    pub frame_dim: u32,

    /// Upper bound on the number of frames the stream will yield. Guards
    /// against timestamp-less streams that never end.
    pub max_frames: u32,
}

impl Default for FrameStreamCfg {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            frame_dim: 512,
            //24 hours of video at the default sampling rate.
            max_frames: 86_400,
        }
    }
}

/// A finite, single-pass iterator of `(timestamp_seconds, luminance_plane)`
/// pairs decoded from one video byte stream.
///
/// The first frame is decoded eagerly by [`FrameStream::open`], so a stream
/// that opens successfully yields at least one frame. Decoder errors after
/// that point are logged and end the sequence.
pub struct FrameStream {
    child: Child,
    stdout: ChildStdout,
    feeder: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<String>>,
    cfg: FrameStreamCfg,
    pending_first: Option<GrayImage>,
    frames_read: u32,
    finished: bool,
}

impl FrameStream {
    /// Spawn the decoder and read the first frame.
    ///
    /// # Errors
    /// * [`ExtractError::Spawn`] if ffmpeg cannot be started.
    /// * [`ExtractError::Decode`] if the stream contains no video.
    /// * [`ExtractError::CorruptStream`] if decoding fails before the first
    ///   frame.
    pub fn open<R>(src: R, cfg: FrameStreamCfg) -> Result<Self, ExtractError>
    where
        R: Read + Send + 'static,
    {
        let mut child = Command::new("ffmpeg")
            .args(ffmpeg_args(&cfg))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractError::Spawn(e.to_string()))?;

        //Pump the byte source into the decoder from a separate thread. ffmpeg
        //may stop reading at any point (it has seen the whole mapped stream,
        //or it died); a failed copy is not an error here.
        let mut stdin = child.stdin.take().expect("stdin was piped");
        let feeder = std::thread::spawn(move || {
            let mut src = src;
            let _ = io::copy(&mut src, &mut stdin);
        });

        //Drain stderr for the whole life of the child. If nobody reads it,
        //a chatty decoder eventually fills the OS pipe buffer, blocks on the
        //write, and stops producing stdout frames, and the frame reads below
        //hang with it. The collected text also feeds the failure diagnosis.
        let mut stderr = child.stderr.take().expect("stderr was piped");
        let stderr_drain = std::thread::spawn(move || {
            let mut text = String::new();
            let _read_error = stderr.read_to_string(&mut text);
            text
        });

        let stdout = child.stdout.take().expect("stdout was piped");

        let mut stream = Self {
            child,
            stdout,
            feeder: Some(feeder),
            stderr_drain: Some(stderr_drain),
            cfg,
            pending_first: None,
            frames_read: 0,
            finished: false,
        };

        match stream.read_raw_frame() {
            RawFrame::Frame(img) => {
                stream.pending_first = Some(img);
                Ok(stream)
            }
            RawFrame::Eof | RawFrame::Truncated => Err(stream.classify_first_frame_failure()),
        }
    }

    /// The number of frames yielded so far.
    pub fn frames_read(&self) -> u32 {
        self.frames_read
    }

    fn read_raw_frame(&mut self) -> RawFrame {
        let dim = self.cfg.frame_dim;
        let mut buf = vec![0u8; dim as usize * dim as usize];
        match fill_frame(&mut self.stdout, &mut buf) {
            Ok(FrameFill::Full) => {
                let img = GrayImage::from_raw(dim, dim, buf)
                    .expect("buffer length matches the frame dimensions");
                RawFrame::Frame(img)
            }
            Ok(FrameFill::Eof) => RawFrame::Eof,
            Ok(FrameFill::Truncated(n)) => {
                warn!("decoder output ended mid-frame ({n} bytes of a partial frame)");
                RawFrame::Truncated
            }
            Err(e) => {
                warn!("error reading decoder output: {e}");
                RawFrame::Truncated
            }
        }
    }

    //The decoder produced nothing. Reap it and decide whether the input had
    //no video stream at all, or a stream that could not be decoded.
    fn classify_first_frame_failure(&mut self) -> ExtractError {
        let status = match self.child.wait_timeout(REAP_TIMEOUT) {
            Ok(Some(status)) => Some(status),
            Ok(None) | Err(_) => {
                let _kill_error = self.child.kill();
                let _wait_error = self.child.wait();
                None
            }
        };
        self.finished = true;

        let mut detail = self.stderr_tail();
        if detail.is_empty() {
            detail = match status {
                Some(s) => format!("ffmpeg exited with {s} before the first frame"),
                None => "ffmpeg produced no frames and had to be killed".to_string(),
            };
        }

        //ffmpeg reports an absent video stream through the -map argument.
        if detail.contains("matches no streams") || detail.contains("does not contain any stream") {
            ExtractError::Decode { detail }
        } else {
            ExtractError::CorruptStream { detail }
        }
    }

    //The child must be dead before this is called, or the join would wait
    //for its stderr to close.
    fn stderr_tail(&mut self) -> String {
        let text = match self.stderr_drain.take() {
            Some(drain) => drain.join().unwrap_or_default(),
            None => String::new(),
        };
        //keep only the last few lines; ffmpeg repeats itself
        let tail_start = text
            .trim_end()
            .rmatch_indices('\n')
            .nth(3)
            .map_or(0, |(i, _)| i + 1);
        text[tail_start..].trim().to_string()
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
        if let Some(feeder) = self.feeder.take() {
            let _join_error = feeder.join();
        }
        if let Some(drain) = self.stderr_drain.take() {
            let _join_error = drain.join();
        }
    }
}

impl Iterator for FrameStream {
    type Item = (f32, GrayImage);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.frames_read >= self.cfg.max_frames {
            self.finish();
            return None;
        }

        let img = match self.pending_first.take() {
            Some(img) => img,
            None => match self.read_raw_frame() {
                RawFrame::Frame(img) => img,
                RawFrame::Eof | RawFrame::Truncated => {
                    self.finish();
                    return None;
                }
            },
        };

        let timestamp = self.frames_read as f32 / self.cfg.sample_rate as f32;
        self.frames_read += 1;
        Some((timestamp, img))
    }
}

//a dropped stream must not leave a zombie decoder behind
impl Drop for FrameStream {
    fn drop(&mut self) {
        self.finish();
    }
}

#[derive(Debug)]
enum RawFrame {
    Frame(GrayImage),
    Eof,
    Truncated,
}

#[derive(Debug, PartialEq, Eq)]
enum FrameFill {
    Full,
    Eof,
    Truncated(usize),
}

//Read until buf is full or the reader is exhausted. EOF on a frame boundary
//is a clean end of stream; EOF inside a frame means the decoder died.
fn fill_frame(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<FrameFill> {
    let mut head = 0;
    while head < buf.len() {
        match reader.read(&mut buf[head..]) {
            Ok(0) if head == 0 => return Ok(FrameFill::Eof),
            Ok(0) => return Ok(FrameFill::Truncated(head)),
            Ok(n) => head += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(FrameFill::Full)
}

fn ffmpeg_args(cfg: &FrameStreamCfg) -> Vec<String> {
    let dim = cfg.frame_dim;
    let rate = cfg.sample_rate;
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        //decode the first video stream only; audio, subtitles and attached
        //pictures are ignored
        "-map".to_string(),
        "0:v:0".to_string(),
        "-vf".to_string(),
        format!("fps={rate},scale={dim}:{dim}:flags=area"),
        "-pix_fmt".to_string(),
        "gray".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "pipe:1".to_string(),
    ]
}
