//! End-to-end bakes of small sectors.

use lightbake::prelude::*;
use lightbake::core::SwapCache;
use lightbake::lightmap::{build_masks, fixup_lightmap};
use lightbake::scene::PrimitiveRef;
use lightbake::transport::direct_lighting;

use tempfile::TempDir;

/// Axis-aligned square of side `size` centered at `center`, facing `+z`
/// (or `-z` when `up` is false).
fn square(name: &str, center: Vec3, size: f32, up: bool) -> Object {
    let h = size * 0.5;
    let corners = [[-h, -h], [h, -h], [h, h], [-h, h]];
    let normal = if up { Vec3::Z } else { -Vec3::Z };
    let verts = corners
        .iter()
        .map(|c| Vertex::new(center + Vec3::new(c[0], c[1], 0.0), normal))
        .collect();
    let tris: &[[usize; 3]] = if up { &[[0, 1, 2], [0, 2, 3]] } else { &[[0, 2, 1], [0, 3, 2]] };
    let (object, dropped) = Object::from_triangles(name, verts, tris);
    assert_eq!(dropped, 0);
    object
}

fn config(dir: &TempDir) -> BakeConfig {
    let mut config = BakeConfig::default();
    config.lightmap.density = 1.0;
    config.swap.swap_dir = Some(dir.path().to_path_buf());
    config
}

const COLOR: Vec3 = Vec3::new(1.0, 0.5, 0.25);

/// Unit square at the origin lands on a single fully covered texel (2, 2)
/// of a 4x4 atlas at density 1.
fn lit_square_sector(light_height: f32) -> Sector {
    let mut sector = Sector::new("room");
    sector.objects.push(square("floor", Vec3::ZERO, 1.0, true));
    sector.lights.push(Light::point("lamp", Vec3::new(0.0, 0.0, light_height), COLOR, 8.0));
    sector
}

#[test]
fn test_point_light_over_full_texel() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let baker = Baker::new(config(&dir)).expect("Invalid config");
    let mut sector = lit_square_sector(2.0);
    let bake = baker.bake_sector(0, &mut sector, &NoProgress).expect("Bake failed");
    println!("stats: {:?}", bake.stats);

    assert_eq!(bake.atlas_sizes, vec![(4, 4)]);
    let lock = bake.lightmaps[0].lock().expect("Lock failed");
    // P * C / d^2 with cos = 1, full coverage and no occluder.
    let expected = COLOR * 8.0 / 4.0;
    let texel = lock.get(2, 2);
    assert!((texel - expected).length() < 1e-3, "{texel:?} vs {expected:?}");

    let uvs = bake.normalized_uvs(&sector.objects[0]);
    assert!((uvs[0] - Vec2::splat(0.5)).length() < 1e-5, "{:?}", uvs[0]);
    assert!((uvs[2] - Vec2::splat(0.75)).length() < 1e-5, "{:?}", uvs[2]);
}

#[test]
fn test_occluded_texel_stays_dark() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let baker = Baker::new(config(&dir)).expect("Invalid config");
    let mut sector = lit_square_sector(2.0);
    let mut blocker = square("blocker", Vec3::new(0.0, 0.0, 1.0), 2.0, false);
    blocker.no_light = true;
    sector.objects.push(blocker);

    let bake = baker.bake_sector(0, &mut sector, &NoProgress).expect("Bake failed");
    assert_eq!(bake.atlas_sizes.len(), 1, "blocker must not take lightmap space");
    assert_eq!(bake.stats.direct.lit_elements, 0);
    let lock = bake.lightmaps[0].lock().expect("Lock failed");
    assert_eq!(lock.one_color(0.0), Some(Color::ZERO));
}

#[test]
fn test_fixup_fills_border_ring() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let baker = Baker::new(config(&dir)).expect("Invalid config");
    let mut sector = lit_square_sector(2.0);
    let bake = baker.bake_sector(0, &mut sector, &NoProgress).expect("Bake failed");
    let lock = bake.lightmaps[0].lock().expect("Lock failed");

    let center = lock.get(2, 2);
    for (x, y) in [(1, 1), (2, 1), (3, 3), (1, 3)] {
        assert!((lock.get(x, y) - center).length() < 1e-6, "texel ({x}, {y})");
    }
    // No covered neighbour: stays black.
    assert_eq!(lock.get(0, 0), Color::ZERO);
}

#[test]
fn test_manual_mapping_direct_then_fixup() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let cache = SwapCache::new(dir.path(), 1 << 20, "manual");

    // Same square mapped by hand onto texel (1, 1) of a 3x3 lightmap.
    let mut object = square("floor", Vec3::splat(0.5).with_z(0.0), 1.0, true);
    for v in &mut object.vertices.vertices {
        v.lightmap_uv = v.position.truncate() + 0.5;
    }
    for prim in &mut object.primitives {
        prim.lightmap = Some(0);
        assert!(prim.prepare(&object.vertices, None, Color::ZERO));
    }
    let mut sector = Sector::new("manual");
    sector.objects.push(object);
    sector.lights.push(Light::point("lamp", Vec3::new(0.5, 0.5, 4.0), COLOR, 32.0));

    let lightmaps = vec![Lightmap::new(&cache, 3, 3)];
    let tracer = BvhTracer::from_sector(&sector);
    let config = BakeConfig::default();
    let stats = direct_lighting(&mut sector, &lightmaps, &tracer, &config.direct, 7, &NoProgress)
        .expect("Direct lighting failed");
    assert_eq!(stats.candidates, 2);

    let masks = build_masks(&cache, &sector, &[(3, 3)]).expect("Mask build failed");
    let mut lock = lightmaps[0].lock().expect("Lock failed");
    fixup_lightmap(&mut lock, &masks[0].lock().expect("Mask lock failed"), 1e-4);
    let expected = COLOR * 32.0 / 16.0;
    assert!((lock.get(1, 1) - expected).length() < 1e-3);
    assert!((lock.get(0, 2) - expected).length() < 1e-3);

    let prim = sector.primitive(PrimitiveRef::new(0, 1));
    let total: f32 = prim.element_areas.iter().sum();
    assert!((total - prim.area()).abs() < 1e-4);
}

#[test]
fn test_save_png_and_hdr() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let baker = Baker::new(config(&dir)).expect("Invalid config");
    let mut sector = lit_square_sector(2.0);
    let bake = baker.bake_sector(0, &mut sector, &NoProgress).expect("Bake failed");

    let out = dir.path().join("maps");
    let pngs = bake
        .save_lightmaps(&out, LightmapFormat::Png(Exposure::default()))
        .expect("PNG export failed");
    assert_eq!(pngs, vec![out.join("room_lm0.png")]);
    let image = image::open(&pngs[0]).expect("Failed to read PNG").to_rgb8();
    assert_eq!(image.dimensions(), (4, 4));
    // 2 * C at the default exposure scale of 0.5.
    let px = image.get_pixel(2, 2).0;
    for (got, want) in px.iter().zip([255u8, 128, 64]) {
        assert!(got.abs_diff(want) <= 1, "{px:?}");
    }

    let hdrs = bake.save_lightmaps(&out, LightmapFormat::Hdr).expect("HDR export failed");
    assert!(std::fs::metadata(&hdrs[0]).expect("HDR missing").len() > 0);
}

#[test]
fn test_sectors_bake_independently() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let baker = Baker::new(config(&dir)).expect("Invalid config");
    let mut sectors = vec![lit_square_sector(2.0), lit_square_sector(4.0)];
    sectors[1].name = "hall".into();

    let progress = ProgressIndicator::new();
    let results = baker.bake(&mut sectors, &progress);
    let bakes: Vec<SectorBake> = results.into_iter().map(|r| r.expect("Sector failed")).collect();
    assert_eq!(bakes[0].name, "room");
    assert_eq!(bakes[1].name, "hall");

    let near = bakes[0].lightmaps[0].lock().expect("Lock failed").get(2, 2);
    let far = bakes[1].lightmaps[0].lock().expect("Lock failed").get(2, 2);
    // Inverse square falloff.
    assert!((near - far * 4.0).length() < 1e-3, "{near:?} {far:?}");
    assert!(progress.advanced() > 0);
}

#[test]
fn test_indirect_light_reaches_shadowed_floor() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut cfg = config(&dir);
    cfg.indirect.enabled = true;
    cfg.indirect.num_photons = 20_000;
    cfg.indirect.search_radius = 2.0;
    cfg.indirect.max_density_samples = 100;
    cfg.indirect.photon_bounces = 1;
    let baker = Baker::new(cfg).expect("Invalid config");

    // Light between a floor and a low ceiling; a small blocker shadows the
    // floor directly under the light so only bounced light reaches it.
    let mut sector = Sector::new("cellar");
    sector.objects.push(square("floor", Vec3::ZERO, 1.0, true));
    let mut ceiling = square("ceiling", Vec3::new(0.0, 0.0, 2.0), 20.0, false);
    ceiling.no_light = true;
    sector.objects.push(ceiling);
    let mut blocker = square("blocker", Vec3::new(0.0, 0.0, 1.0), 2.0, false);
    blocker.no_light = true;
    blocker.reflectance = Color::ZERO;
    sector.objects.push(blocker);
    sector.lights.push(Light::point("lamp", Vec3::new(0.0, 0.0, 1.5), Color::ONE, 10.0));

    let bake = baker.bake_sector(0, &mut sector, &NoProgress).expect("Bake failed");
    let emission = bake.stats.emission.expect("No emission stats");
    assert_eq!(emission.emitted, 20_000);
    assert!(emission.stored > 0);
    assert_eq!(bake.stats.direct.lit_elements, 0);
    let texel = bake.lightmaps[0].lock().expect("Lock failed").get(2, 2);
    assert!(texel.x > 0.0, "{texel:?}");
}
