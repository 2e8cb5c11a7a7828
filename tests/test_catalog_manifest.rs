use gdal::raster::Buffer;
use gdal::DriverManager;
use ndarray::Array2;
use std::fs;
use std::path::Path;

use s2compose::{BandId, Catalog, FilterParams};

fn write_dn_raster(path: &Path, data: &Array2<u16>, geo_transform: [f64; 6]) {
    let (rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<u16, _>(path, cols, rows, 1)
        .unwrap();
    dataset.set_geo_transform(&geo_transform).unwrap();
    let mut band = dataset.rasterband(1).unwrap();
    let mut buffer = Buffer::new((cols, rows), data.iter().copied().collect());
    band.write((0, 0), (cols, rows), &mut buffer).unwrap();
}

fn build_catalog_dir(dir: &Path) {
    let gt = [600000.0, 10.0, 0.0, 4260000.0, 0.0, -10.0];
    fs::create_dir_all(dir.join("granules")).unwrap();

    // Granule one: clear at [0,0] and [0,1], cloudy at [1,0] and [1,1]
    write_dn_raster(
        &dir.join("granules/g1_B04.tif"),
        &Array2::from_shape_vec((2, 2), vec![2000, 4000, 1000, 3000]).unwrap(),
        gt,
    );
    write_dn_raster(
        &dir.join("granules/g1_QA60.tif"),
        &Array2::from_shape_vec((2, 2), vec![0, 0, 1 << 10, 1 << 11]).unwrap(),
        gt,
    );

    // Granule two: fully clear
    write_dn_raster(
        &dir.join("granules/g2_B04.tif"),
        &Array2::from_shape_vec((2, 2), vec![4000, 4000, 5000, 5000]).unwrap(),
        gt,
    );
    write_dn_raster(
        &dir.join("granules/g2_QA60.tif"),
        &Array2::from_shape_vec((2, 2), vec![0, 0, 0, 0]).unwrap(),
        gt,
    );

    let manifest = r#"<?xml version="1.0" encoding="UTF-8"?>
<granuleList>
  <granule>
    <granuleId>S2A_MSIL2A_20241012T184221</granuleId>
    <sensingTime>2024-10-12T18:42:21Z</sensingTime>
    <cloudyPixelPercentage>12.4</cloudyPixelPercentage>
    <bandFileList>
      <bandFile band="B04">granules/g1_B04.tif</bandFile>
      <bandFile band="QA60">granules/g1_QA60.tif</bandFile>
    </bandFileList>
  </granule>
  <granule>
    <granuleId>S2B_MSIL2A_20241027T184359</granuleId>
    <sensingTime>2024-10-27T18:43:59Z</sensingTime>
    <cloudyPixelPercentage>55.0</cloudyPixelPercentage>
    <bandFileList>
      <bandFile band="B04">granules/g2_B04.tif</bandFile>
      <bandFile band="QA60">granules/g2_QA60.tif</bandFile>
    </bandFileList>
  </granule>
</granuleList>"#;
    fs::write(dir.join("catalog.xml"), manifest).unwrap();
}

#[test]
fn test_catalog_loads_scenes_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    build_catalog_dir(dir.path());

    let catalog = Catalog::from_manifest(dir.path().join("catalog.xml")).unwrap();
    assert_eq!(catalog.len(), 2);

    let first = &catalog.scenes()[0];
    assert_eq!(first.granule_id(), "S2A_MSIL2A_20241012T184221");
    assert_eq!(first.cloud_pct(), 12.4);
    assert_eq!(first.shape(), (2, 2));
    assert_eq!(first.band(BandId::B04).unwrap()[[0, 0]], 2000);
    assert_eq!(first.qa()[[1, 0]], 1 << 10);
    assert_eq!(first.geo_transform().top_left_x, 600000.0);
    assert_eq!(first.geo_transform().pixel_width, 10.0);
}

#[test]
fn test_catalog_query_applies_cloud_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    build_catalog_dir(dir.path());

    let catalog = Catalog::from_manifest(dir.path().join("catalog.xml")).unwrap();
    let collection = catalog.query(&FilterParams::default());

    // The 55% granule falls to the default 20% ceiling
    assert_eq!(collection.len(), 1);
    assert_eq!(
        collection.scenes()[0].granule_id(),
        "S2A_MSIL2A_20241012T184221"
    );
}

#[test]
fn test_manifest_missing_qa_band_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    build_catalog_dir(dir.path());

    let manifest = r#"<granuleList>
  <granule>
    <granuleId>S2A_NO_QA</granuleId>
    <sensingTime>2024-10-12T18:42:21Z</sensingTime>
    <cloudyPixelPercentage>1.0</cloudyPixelPercentage>
    <bandFileList>
      <bandFile band="B04">granules/g1_B04.tif</bandFile>
    </bandFileList>
  </granule>
</granuleList>"#;
    fs::write(dir.path().join("no_qa.xml"), manifest).unwrap();

    let result = Catalog::from_manifest(dir.path().join("no_qa.xml"));
    assert!(result.is_err());
}

#[test]
fn test_missing_raster_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let manifest = r#"<granuleList>
  <granule>
    <granuleId>S2A_GONE</granuleId>
    <sensingTime>2024-10-12T18:42:21Z</sensingTime>
    <cloudyPixelPercentage>1.0</cloudyPixelPercentage>
    <bandFileList>
      <bandFile band="B04">granules/missing.tif</bandFile>
      <bandFile band="QA60">granules/missing_qa.tif</bandFile>
    </bandFileList>
  </granule>
</granuleList>"#;
    fs::write(dir.path().join("gone.xml"), manifest).unwrap();

    let result = Catalog::from_manifest(dir.path().join("gone.xml"));
    assert!(result.is_err());
}
