//! Kinematics micro-benchmark — per-call cost of the pure conversion
//! functions that sit on the hot path of every primitive in the
//! Pipetting Executor.

use criterion::{criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use sampler_common::config::Configuration;
use sampler_common::volume::MilliLiters;
use sampler_common::well::WellId;
use sampler_executor::kinematics::{
    clamp_to_envelope, steps_to_volume, volume_to_pipette_steps, well_to_xy, xy_to_well,
};

fn reference_config() -> Configuration {
    Configuration {
        well_spacing_mm: 9.0,
        well_diameter_mm: 6.5,
        well_height_mm: 11.0,
        steps_per_mm_x: 100.0,
        steps_per_mm_y: 100.0,
        steps_per_mm_z: 400.0,
        pipette_steps_per_ml: 1000.0,
        pickup_depth_mm: 8.0,
        dropoff_depth_mm: 5.0,
        safe_height_mm: 20.0,
        rinse_cycles: 2.0,
        travel_speed_s_per_step: 0.001,
        pipette_speed_s_per_step: 0.002,
        pipette_capacity_ml: 1.0,
        home_direction_x: 0.0,
        home_direction_y: 0.0,
        home_direction_z: 0.0,
        home_direction_pipette: 0.0,
    }
}

fn bench_well_to_xy(c: &mut Criterion) {
    let config = reference_config();
    let wells: Vec<WellId> = (0..8u8)
        .flat_map(|row| (1..=12u8).map(move |col| WellId::new(row, col).unwrap()))
        .collect();
    let mut i = 0usize;

    c.bench_function("well_to_xy", |b| {
        b.iter(|| {
            i = (i + 1) % wells.len();
            well_to_xy(wells[i], &config)
        });
    });
}

fn bench_xy_to_well(c: &mut Criterion) {
    let config = reference_config();
    let points: Vec<_> = (0..8u8)
        .flat_map(|row| (1..=12u8).map(move |col| WellId::new(row, col).unwrap()))
        .map(|w| well_to_xy(w, &config))
        .collect();
    let mut i = 0usize;

    c.bench_function("xy_to_well", |b| {
        b.iter(|| {
            i = (i + 1) % points.len();
            xy_to_well(points[i], &config)
        });
    });
}

fn bench_clamp_to_envelope(c: &mut Criterion) {
    let config = reference_config();
    let xy = well_to_xy(WellId::new(7, 12).unwrap(), &config);

    c.bench_function("clamp_to_envelope", |b| {
        b.iter(|| clamp_to_envelope(xy, &config));
    });
}

fn bench_volume_round_trip(c: &mut Criterion) {
    let config = reference_config();
    let vol = MilliLiters::new(Decimal::new(5, 1)).unwrap();

    c.bench_function("volume_to_pipette_steps", |b| {
        b.iter(|| volume_to_pipette_steps(vol, &config));
    });

    let steps = volume_to_pipette_steps(vol, &config);
    c.bench_function("steps_to_volume", |b| {
        b.iter(|| steps_to_volume(steps, &config));
    });
}

criterion_group!(
    benches,
    bench_well_to_xy,
    bench_xy_to_well,
    bench_clamp_to_envelope,
    bench_volume_round_trip,
);
criterion_main!(benches);
