use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use photo_align::core::{
    warp, CorrespondenceSet, Homography, HomographyEstimator, Image, Interpolation, Point,
};
use photo_align::features::{detect_correspondences, MatcherParams};

fn make_set(n: usize, outliers: usize, seed: u64) -> CorrespondenceSet {
    let h = Homography::from_array([[1.02, 0.03, 12.0], [-0.02, 0.98, -7.0], [1e-5, 2e-5, 1.0]]);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = CorrespondenceSet::new();
    for i in 0..n {
        let t = Point::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..800.0));
        let r = if i < outliers {
            Point::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..800.0))
        } else {
            let p = h.apply(t);
            Point::new(p.x + rng.gen_range(-0.5..0.5), p.y + rng.gen_range(-0.5..0.5))
        };
        set.add(r.x, r.y, t.x, t.y);
    }
    set
}

fn make_texture(w: usize, h: usize, seed: u64) -> Image {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks: Vec<u8> = (0..(w / 4 + 1) * (h / 4 + 1)).map(|_| rng.gen()).collect();
    Image::from_fn(w, h, 3, |x, y, c| {
        let v = blocks[(y / 4) * (w / 4 + 1) + x / 4];
        v.wrapping_add(c as u8 * 30)
    })
}

fn bench_ransac(c: &mut Criterion) {
    let clean = make_set(200, 0, 3);
    let noisy = make_set(200, 60, 5);
    let estimator = HomographyEstimator::default();

    c.bench_function("ransac_200pts_clean", |b| {
        b.iter(|| black_box(estimator.estimate(black_box(&clean)).map(|f| f.inlier_count())))
    });
    c.bench_function("ransac_200pts_30pct_outliers", |b| {
        b.iter(|| black_box(estimator.estimate(black_box(&noisy)).map(|f| f.inlier_count())))
    });
}

fn bench_warp(c: &mut Criterion) {
    let img = make_texture(1280, 960, 11);
    let h = Homography::from_array([[0.99, 0.02, 8.0], [-0.01, 1.01, -4.0], [1e-5, -1e-5, 1.0]]);

    c.bench_function("warp_1280x960_nearest", |b| {
        b.iter(|| {
            let out = warp(&img.view(), black_box(&h), 1280, 960, Interpolation::Nearest);
            black_box(out.map(|o| o.data.len()))
        })
    });
    c.bench_function("warp_1280x960_bilinear", |b| {
        b.iter(|| {
            let out = warp(&img.view(), black_box(&h), 1280, 960, Interpolation::Bilinear);
            black_box(out.map(|o| o.data.len()))
        })
    });
}

fn bench_matching(c: &mut Criterion) {
    let a = make_texture(640, 480, 21);
    let b_img = a.crop(&photo_align::core::BoundingRect::new(7, 5, 640, 480));
    let params = MatcherParams::default();

    c.bench_function("match_640x480_50pts", |b| {
        b.iter(|| {
            let set = detect_correspondences(&a.view(), &b_img.view(), 50, black_box(&params));
            black_box(set.len())
        })
    });
}

criterion_group!(hotpaths, bench_ransac, bench_warp, bench_matching);
criterion_main!(hotpaths);
