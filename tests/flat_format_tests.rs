// Flat format imports: PLINK tables, expression CSV and accession files

use std::fs;

use phenotype_core::exchange::accessions::{parse_accession_file, parse_accession_ids};
use phenotype_core::exchange::flat::{write_values_csv, TraitTable};
use phenotype_core::model::TraitKind;
use phenotype_core::{import_study, IdAllocator, MemoryStore, PhenoError, PhenotypeStore};

#[test]
fn test_import_plink_file_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flowering.plink");
    fs::write(
        &path,
        "FID IID FT10 FT16\n6909 6909 60.5 70\n6910 6910 NA 80\n6909 6909 61 NA\n",
    )
    .unwrap();

    let bundle = import_study(&path, &mut IdAllocator::default()).unwrap();
    assert_eq!(bundle.study.name, "flowering");
    assert_eq!(bundle.traits.len(), 2);
    assert!(bundle.traits.iter().all(|t| t.kind == TraitKind::Phenotype));
    assert_eq!(bundle.observation_units.len(), 3);
    assert_eq!(bundle.accessions.len(), 2);
    assert_eq!(bundle.values.len(), 4);
}

#[test]
fn test_import_expression_csv_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rnaseq.csv");
    fs::write(&path, ",AT1G01010,AT1G01020\n6909,3.5,0.0\n6910,1.25,\n").unwrap();

    let bundle = import_study(&path, &mut IdAllocator::default()).unwrap();
    assert_eq!(bundle.traits.len(), 2);
    assert!(bundle.traits.iter().all(|t| t.kind == TraitKind::Expression));
    assert_eq!(bundle.traits[0].scoring.as_deref(), Some("TPM"));
    assert_eq!(bundle.values.len(), 3);
}

#[test]
fn test_malformed_plink_header_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.plink");
    fs::write(&path, "FID;IID;FT10\n1;1;2\n").unwrap();

    let err = import_study(&path, &mut IdAllocator::default()).unwrap_err();
    assert!(matches!(err, PhenoError::Format(_)));
}

#[test]
fn test_single_trait_export_round_trip() {
    let table = TraitTable::parse_plink("FID IID FT_10\n6909 6909 60.5\n6910 6910 71\n").unwrap();
    let store = MemoryStore::from_bundle(table.into_bundle(
        "ft",
        TraitKind::Phenotype,
        None,
        &mut IdAllocator::default(),
    ));

    let exported = TraitTable::for_trait(&store, 1).unwrap();
    let mut out = Vec::new();
    exported.write_plink(&mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "FID IID FT_10\n6909 6909 60.5\n6910 6910 71\n"
    );

    let mut csv = Vec::new();
    assert_eq!(write_values_csv(&store, 1, &mut csv).unwrap(), 2);
    assert_eq!(store.values_for_trait(1).len(), 2);
}

#[test]
fn test_accession_files() {
    let passport = "id,name,country,sitename,latitude,longitude,collector,collectiondate,CS_number\n\
                    6909,Col-0,USA,Columbia,38.3,-92.3,,,CS76778\n";
    let accessions = parse_accession_file(passport.as_bytes()).unwrap();
    assert_eq!(accessions[0].cs_number.as_deref(), Some("CS76778"));

    assert_eq!(parse_accession_ids("6909,6910").unwrap(), vec![6909, 6910]);
}
