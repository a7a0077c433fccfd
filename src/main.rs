use std::env;

use anyhow::{Context, Result};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tracestore::data::{
    AnalogPlot, Annotation, CaptureSession, ManualSource, RowData, SampleBlock, Segment,
    SignalData, StoreConfig,
};

const FRAMES: usize = 3;
const BLOCKS_PER_FRAME: usize = 8;
const BLOCK_SAMPLES: usize = 4096;

/// Builds a few frames of synthetic capture: a clock on channel 0, a slow
/// strobe on channel 1, noise on the rest and a noisy sine on the analog side.
fn synthesize(config: &StoreConfig, rng: &mut StdRng) -> Vec<SampleBlock> {
    let unit_size = config.logic_unit_size();
    let mut blocks = Vec::new();
    let mut t = 0u64;
    for _ in 0..FRAMES {
        for _ in 0..BLOCKS_PER_FRAME {
            let mut data = Vec::with_capacity(BLOCK_SAMPLES * unit_size);
            let mut samples = Vec::with_capacity(BLOCK_SAMPLES);
            for _ in 0..BLOCK_SAMPLES {
                let clock = (t / 8) & 1;
                let strobe = u64::from(t % 5000 < 40) << 1;
                let noise: u64 = rng.gen::<u64>() & !0b11;
                let value = clock | strobe | noise;
                data.extend_from_slice(&value.to_le_bytes()[..unit_size]);

                let phase = t as f32 / 2048.0 * std::f32::consts::TAU;
                samples.push(phase.sin() + rng.gen_range(-0.05..0.05));
                t += 1;
            }
            blocks.push(SampleBlock::Logic { unit_size, data });
            blocks.push(SampleBlock::Analog { samples });
        }
        blocks.push(SampleBlock::FrameEnd);
    }
    blocks
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => StoreConfig::load(&path)
            .with_context(|| format!("loading store config from {path}"))?,
        None => StoreConfig::default(),
    };
    info!(
        "samplerate {} Hz, {} logic channels",
        config.samplerate, config.logic_channels
    );

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let source = ManualSource::new(synthesize(&config, &mut rng));
    let mut session = CaptureSession::new(source, config.clone())?;
    let total = session.run_to_end().context("capture failed")?;
    info!(
        "captured {total} samples into {} logic and {} analog segments",
        session.logic().logic_segments().len(),
        session.analog().analog_segments().len()
    );

    let Some(segment) = session.logic().logic_segments().newest().cloned() else {
        anyhow::bail!("capture produced no logic segment");
    };
    let last = segment.get_sample_count() - 1;
    for zoom in [1.0f32, 64.0, 4096.0] {
        let edges = segment.subsampled_edges(0, last, zoom, 0).count();
        let strobe = segment.subsampled_edges(0, last, zoom, 1).count();
        info!("{zoom:>6} samples/px: {edges} clock edges, {strobe} strobe edges");
    }

    if let Some(analog) = session.analog().analog_segments().newest() {
        let end = analog.get_sample_count();
        for spp in [16.0f32, 1024.0] {
            match analog.plot_data(0, end, spp, config.envelope_threshold) {
                AnalogPlot::Samples(samples) => {
                    info!("{spp:>6} samples/px: {} raw samples", samples.len())
                }
                AnalogPlot::Envelope(section) => info!(
                    "{spp:>6} samples/px: {} envelope bars of {} samples",
                    section.length, section.scale
                ),
            }
        }
    }

    // Strobe pulses as decoder annotations.
    let mut row = RowData::new();
    let mut pulse_start = None;
    for (sample, high) in segment.subsampled_edges(0, last, 1.0, 1) {
        match (high, pulse_start) {
            (true, None) => pulse_start = Some(sample),
            (false, Some(start)) => {
                row.push_annotation(Annotation::new(start, sample, 0, vec!["STB".into()]));
                pulse_start = None;
            }
            _ => {}
        }
    }
    let visible = row.get_annotation_subset(0, last / 2).len();
    info!(
        "{} strobe annotations, {visible} in the first half, last ends at {}",
        row.len(),
        row.get_max_sample()
    );

    let duration = session.logic().logic_segments().total_time();
    session.logic_mut().crop(duration * 0.25, duration * 0.75);
    session.analog_mut().crop(duration * 0.25, duration * 0.75);
    info!(
        "after crop: longest logic segment {} samples, longest analog segment {} samples",
        session.logic().get_max_sample_count(),
        session.analog().get_max_sample_count()
    );
    Ok(())
}
