//! libav-backed encode session.
//!
//! All libav calls are blocking and run on the blocking thread pool. The
//! async cancellation signal is mirrored into an atomic flag that the
//! session checks once per packet and once per encoded frame.

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, packet::Packet};
use ffmpeg::format::{self, Pixel};
use ffmpeg::util::frame;
use ffmpeg::util::picture;
use ffmpeg::{filter, media, Dictionary, Rational};
use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use vclip_models::encoding::{is_keyframe, RateControl};
use vclip_models::OutputFormat;

use super::{FastPathPlan, ENCODE_PHASE, FLUSH_PHASE, LOAD_PHASE, SETUP_PHASE};
use crate::capabilities::EnvironmentCapabilities;
use crate::command::wait_for_cancel;
use crate::encoder::{EncodeJob, EncodedClip};
use crate::error::{MediaError, MediaResult};
use crate::progress::ProgressReporter;

const AV_TIME_BASE: f64 = 1_000_000.0;

/// Probe linked libav for usable encoders.
pub(crate) fn detect_capabilities() -> EnvironmentCapabilities {
    if let Err(e) = ffmpeg::init() {
        warn!("libav initialization failed: {}", e);
        return EnvironmentCapabilities::none();
    }

    let mut caps = EnvironmentCapabilities::none();
    for (format, id) in [
        (OutputFormat::Mp4, codec::Id::H264),
        (OutputFormat::Webm, codec::Id::VP9),
    ] {
        if let Some(codec) = ffmpeg::encoder::find(id) {
            caps.native_formats.push(format);
            caps.native_encoders.push(codec.name().to_string());
        }
    }
    caps
}

pub(crate) async fn encode(
    job: &EncodeJob,
    plan: FastPathPlan,
    progress: ProgressReporter,
    cancel: watch::Receiver<bool>,
) -> MediaResult<EncodedClip> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let watcher = tokio::spawn(async move {
        wait_for_cancel(Some(cancel)).await;
        flag.store(true, Ordering::SeqCst);
    });

    let source = job.request.source.clone();
    let output = job.output_path();
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = tokio::task::spawn_blocking(move || {
        run_session(&source, &output, &plan, &progress, &cancelled)
    })
    .await;
    watcher.abort();

    result.map_err(|e| MediaError::internal(format!("fast path session panicked: {}", e)))?
}

fn native<E: Display>(stage: &'static str) -> impl Fn(E) -> MediaError {
    move |e| MediaError::encode_failed(format!("{}: {}", stage, e))
}

fn seconds_to_ts(seconds: f64, time_base: Rational) -> i64 {
    if time_base.numerator() == 0 {
        return 0;
    }
    (seconds * time_base.denominator() as f64 / time_base.numerator() as f64).round() as i64
}

fn run_session(
    source: &Path,
    output: &Path,
    plan: &FastPathPlan,
    progress: &ProgressReporter,
    cancelled: &AtomicBool,
) -> MediaResult<EncodedClip> {
    ffmpeg::init().map_err(native("init"))?;

    let mut ictx = format::input(&source).map_err(native("open input"))?;

    let (video_index, video_tb, video_params) = {
        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| MediaError::encode_failed("source has no video stream"))?;
        (stream.index(), stream.time_base(), stream.parameters())
    };
    let audio_in = if plan.copy_audio {
        ictx.streams()
            .best(media::Type::Audio)
            .filter(|s| s.parameters().id() == codec::Id::AAC)
            .map(|s| (s.index(), s.time_base(), s.parameters()))
    } else {
        None
    };

    let decoder = codec::context::Context::from_parameters(video_params)
        .map_err(native("decoder context"))?
        .decoder()
        .video()
        .map_err(native("open decoder"))?;
    progress.report_phase(LOAD_PHASE, 1.0);

    let graph = build_graph(&decoder, video_tb, &plan.filter)?;
    progress.report_phase(SETUP_PHASE, 0.3);

    let mut octx = format::output(&output).map_err(native("open output"))?;
    let global_header = octx
        .format()
        .flags()
        .contains(format::Flags::GLOBAL_HEADER);

    let codec_id = match plan.format {
        OutputFormat::Mp4 => codec::Id::H264,
        OutputFormat::Webm => codec::Id::VP9,
    };
    let video_codec = ffmpeg::encoder::find(codec_id)
        .ok_or_else(|| MediaError::unsupported(format!("no {:?} encoder linked", codec_id)))?;

    let encoder_tb = Rational::new(1, plan.fps as i32);
    let mut ost = octx.add_stream(video_codec).map_err(native("add video stream"))?;
    let video_out = ost.index();

    let mut settings = codec::context::Context::new_with_codec(video_codec)
        .encoder()
        .video()
        .map_err(native("encoder context"))?;
    settings.set_width(plan.width);
    settings.set_height(plan.height);
    settings.set_format(Pixel::YUV420P);
    settings.set_time_base(encoder_tb);
    settings.set_frame_rate(Some(Rational::new(plan.fps as i32, 1)));
    settings.set_gop(plan.keyframe_interval as u32);
    settings.set_bit_rate(plan.bitrate.bits_per_second as usize);
    match plan.bitrate.rate_control {
        RateControl::Variable => settings.set_max_bit_rate((plan.bitrate.bits_per_second * 3 / 2) as usize),
        RateControl::Constant => settings.set_max_bit_rate(plan.bitrate.bits_per_second as usize),
    }
    if global_header {
        settings.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let mut options = Dictionary::new();
    match plan.format {
        OutputFormat::Mp4 => {
            options.set("preset", "veryfast");
            if plan.bitrate.rate_control == RateControl::Constant {
                options.set("x264-params", "nal-hrd=cbr");
            }
        }
        OutputFormat::Webm => {
            options.set("deadline", "realtime");
            options.set("cpu-used", "8");
        }
    }

    let encoder = settings.open_with(options).map_err(native("open encoder"))?;
    ost.set_parameters(&encoder);

    let audio = match audio_in {
        Some((index, in_tb, params)) => {
            let mut stream = octx
                .add_stream(ffmpeg::encoder::find(codec::Id::None))
                .map_err(native("add audio stream"))?;
            stream.set_parameters(params);
            Some(AudioCopy {
                in_index: index,
                in_tb,
                out_index: stream.index(),
                out_tb: in_tb,
                start: seconds_to_ts(plan.start_time, in_tb),
                end: seconds_to_ts(plan.end_time, in_tb),
            })
        }
        None => None,
    };

    octx.write_header().map_err(native("write header"))?;
    let video_out_tb = octx
        .stream(video_out)
        .map(|s| s.time_base())
        .unwrap_or(encoder_tb);
    let audio = audio.map(|mut a| {
        if let Some(stream) = octx.stream(a.out_index) {
            a.out_tb = stream.time_base();
        }
        a
    });
    progress.report_phase(SETUP_PHASE, 1.0);

    if plan.start_time > 0.0 {
        let target = (plan.start_time * AV_TIME_BASE) as i64;
        ictx.seek(target, ..target).map_err(native("seek"))?;
    }

    let mut session = Session {
        decoder,
        graph,
        encoder,
        octx,
        encoder_tb,
        video_out,
        video_out_tb,
        start_pts: seconds_to_ts(plan.start_time, video_tb),
        end_pts: seconds_to_ts(plan.end_time, video_tb),
        frame_index: 0,
        expected_frames: plan.expected_frames(),
        progress,
        cancelled,
    };

    for (stream, packet) in ictx.packets() {
        if cancelled.load(Ordering::SeqCst) {
            return Err(MediaError::Cancelled);
        }

        if stream.index() == video_index {
            session
                .decoder
                .send_packet(&packet)
                .map_err(native("decode"))?;
            if session.drain_decoder()? {
                break;
            }
        } else if let Some(audio) = &audio {
            if stream.index() == audio.in_index {
                session.copy_audio(audio, packet)?;
            }
        }
    }

    session.finish()?;
    let frames = session.frame_index;
    drop(session);

    if frames == 0 {
        return Err(MediaError::encode_failed("no frames decoded in the requested range"));
    }

    let size_bytes = std::fs::metadata(output)?.len();
    debug!(frames, size_bytes, "Native session finished");

    Ok(EncodedClip {
        path: output.to_path_buf(),
        size_bytes,
        duration_seconds: frames as f64 / plan.fps as f64,
        width: plan.width,
        height: plan.height,
    })
}

fn build_graph(decoder: &ffmpeg::decoder::Video, time_base: Rational, filters: &str) -> MediaResult<filter::Graph> {
    let mut graph = filter::Graph::new();

    let pixel_format: ffmpeg::ffi::AVPixelFormat = decoder.format().into();
    let aspect = decoder.aspect_ratio();
    let (sar_num, sar_den) = if aspect.numerator() > 0 && aspect.denominator() > 0 {
        (aspect.numerator(), aspect.denominator())
    } else {
        (1, 1)
    };
    let args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
        decoder.width(),
        decoder.height(),
        pixel_format as i32,
        time_base.numerator(),
        time_base.denominator(),
        sar_num,
        sar_den
    );

    let buffer = filter::find("buffer").ok_or_else(|| MediaError::unsupported("buffer filter missing"))?;
    let sink = filter::find("buffersink").ok_or_else(|| MediaError::unsupported("buffersink filter missing"))?;
    graph.add(&buffer, "in", &args).map_err(native("filter source"))?;
    graph.add(&sink, "out", "").map_err(native("filter sink"))?;
    graph
        .output("in", 0)
        .and_then(|p| p.input("out", 0))
        .and_then(|p| p.parse(filters))
        .map_err(native("parse filter"))?;
    graph.validate().map_err(native("validate filter"))?;

    Ok(graph)
}

struct AudioCopy {
    in_index: usize,
    in_tb: Rational,
    out_index: usize,
    out_tb: Rational,
    start: i64,
    end: i64,
}

struct Session<'a> {
    decoder: ffmpeg::decoder::Video,
    graph: filter::Graph,
    encoder: ffmpeg::encoder::Video,
    octx: format::context::Output,
    encoder_tb: Rational,
    video_out: usize,
    video_out_tb: Rational,
    start_pts: i64,
    end_pts: i64,
    frame_index: u64,
    expected_frames: u64,
    progress: &'a ProgressReporter,
    cancelled: &'a AtomicBool,
}

impl Session<'_> {
    /// Push decoded frames in range into the graph. Returns true once past the end.
    fn drain_decoder(&mut self) -> MediaResult<bool> {
        let mut decoded = frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(ts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            if ts < self.start_pts {
                continue;
            }
            if ts >= self.end_pts {
                return Ok(true);
            }

            decoded.set_pts(Some(ts - self.start_pts));
            self.graph
                .get("in")
                .ok_or_else(|| MediaError::internal("filter source missing"))?
                .source()
                .add(&decoded)
                .map_err(native("filter push"))?;
            self.pull_filtered()?;
        }
        Ok(false)
    }

    fn pull_filtered(&mut self) -> MediaResult<()> {
        let mut filtered = frame::Video::empty();
        loop {
            let received = match self.graph.get("out") {
                Some(mut ctx) => ctx.sink().frame(&mut filtered).is_ok(),
                None => false,
            };
            if !received {
                return Ok(());
            }
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(MediaError::Cancelled);
            }
            // The fps filter may duplicate a trailing frame past the range
            if self.frame_index >= self.expected_frames {
                continue;
            }

            filtered.set_pts(Some(self.frame_index as i64));
            filtered.set_kind(if is_keyframe(self.frame_index) {
                picture::Type::I
            } else {
                picture::Type::None
            });
            self.encoder.send_frame(&filtered).map_err(native("encode"))?;
            self.frame_index += 1;
            self.write_encoded()?;

            self.progress.report_phase(
                ENCODE_PHASE,
                self.frame_index as f64 / self.expected_frames as f64,
            );
        }
    }

    fn write_encoded(&mut self) -> MediaResult<()> {
        let mut encoded = Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.video_out);
            encoded.rescale_ts(self.encoder_tb, self.video_out_tb);
            encoded
                .write_interleaved(&mut self.octx)
                .map_err(native("write video"))?;
        }
        Ok(())
    }

    fn copy_audio(&mut self, audio: &AudioCopy, mut packet: Packet) -> MediaResult<()> {
        let Some(pts) = packet.pts() else {
            return Ok(());
        };
        let dts = packet.dts().unwrap_or(pts);
        if pts < audio.start || pts >= audio.end || dts < audio.start {
            return Ok(());
        }

        packet.set_pts(Some(pts - audio.start));
        packet.set_dts(Some(dts - audio.start));
        packet.rescale_ts(audio.in_tb, audio.out_tb);
        packet.set_stream(audio.out_index);
        packet.set_position(-1);
        packet
            .write_interleaved(&mut self.octx)
            .map_err(native("write audio"))
    }

    fn finish(&mut self) -> MediaResult<()> {
        self.progress.report_phase(FLUSH_PHASE, 0.0);

        self.decoder.send_eof().map_err(native("flush decoder"))?;
        self.drain_decoder()?;
        self.graph
            .get("in")
            .ok_or_else(|| MediaError::internal("filter source missing"))?
            .source()
            .flush()
            .map_err(native("flush filter"))?;
        self.pull_filtered()?;
        self.progress.report_phase(FLUSH_PHASE, 0.4);

        self.encoder.send_eof().map_err(native("flush encoder"))?;
        self.write_encoded()?;
        self.progress.report_phase(FLUSH_PHASE, 0.8);

        self.octx.write_trailer().map_err(native("write trailer"))?;
        self.progress.report_phase(FLUSH_PHASE, 1.0);
        Ok(())
    }
}
