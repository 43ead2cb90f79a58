// ISA-Tab round trip through real archive bytes
//
// Export a store study with the zip writer, import the bytes again and check
// that traits, observation units and values survive.

use approx::assert_relative_eq;
use std::collections::BTreeMap;

use phenotype_core::exchange::isatab::{import_isatab, import_isatab_bytes, IsaTabExporter};
use phenotype_core::model::{
    Accession, ObservationUnit, OntologyRef, OntologySource, Publication, Species, Study, Trait,
};
use phenotype_core::{IdAllocator, MatrixBuilder, MemoryStore, PhenoError, PivotKey, StudyBundle};

fn flowering_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.add_study(Study {
        description: Some("Flowering time in the greenhouse".to_string()),
        species: Some(Species::default()),
        ..Study::new(12, "FT greenhouse")
    });

    let mut ft10 = Trait::new(100, "FT10", 12);
    ft10.scoring = Some("days to flowering".to_string());
    ft10.set_ontology(OntologyRef::new(OntologySource::Trait, "TO:0000344"));
    ft10.set_ontology(OntologyRef::new(OntologySource::Unit, "UO:0000033").with_name("day"));
    ft10.set_ontology(OntologyRef::new(OntologySource::Environment, "EO:0007404"));
    store.add_trait(ft10);
    store.add_trait(Trait::new(101, "leaf number", 12));

    let accessions = [(6909, Some("Col-0")), (6910, Some("Bur-0")), (9380, None)];
    for (id, name) in accessions {
        store.add_accession(Accession::new(id, name.map(str::to_string)));
    }

    // two replicates of Col-0
    let units = [(1, 6909), (2, 6909), (3, 6910), (4, 9380)];
    for (id, accession_id) in units {
        store.add_observation_unit(ObservationUnit { id, accession_id, study_id: 12 });
    }

    store.add_value(100, 1, 54.125);
    store.add_value(100, 2, 57.0);
    store.add_value(100, 3, 71.333333333333);
    store.add_value(101, 1, 11.0);
    store.add_value(101, 4, 0.1 + 0.2);

    store.add_publication(
        12,
        Publication {
            doi: Some("10.1038/ng.2678".to_string()),
            pubmed_id: Some("23793030".to_string()),
            author_order: "Long Q, Rabanal FA".to_string(),
            title: "Massive genomic variation".to_string(),
        },
    );
    store
}

fn exported_bundle() -> StudyBundle {
    StudyBundle::from_store(&flowering_store(), 12).unwrap()
}

#[test]
fn test_round_trip_preserves_counts_and_values() {
    let original = exported_bundle();
    let bytes = IsaTabExporter::default().export(&original).unwrap();
    let imported = import_isatab_bytes(&bytes, &mut IdAllocator::default()).unwrap();

    assert_eq!(imported.traits.len(), original.traits.len());
    assert_eq!(imported.observation_units.len(), original.observation_units.len());
    assert_eq!(imported.values.len(), original.values.len());

    // compare by (trait name, accession id) since ids are reassigned
    let keyed = |bundle: &StudyBundle| -> BTreeMap<(String, i64), Vec<f64>> {
        let mut out: BTreeMap<(String, i64), Vec<f64>> = BTreeMap::new();
        for v in bundle.observed_values() {
            out.entry((v.trait_name, v.accession_id)).or_default().push(v.value);
        }
        for values in out.values_mut() {
            values.sort_by(f64::total_cmp);
        }
        out
    };
    let before = keyed(&original);
    let after = keyed(&imported);
    assert_eq!(before.keys().collect::<Vec<_>>(), after.keys().collect::<Vec<_>>());
    for (key, values) in &before {
        for (a, b) in values.iter().zip(&after[key]) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_round_trip_preserves_metadata() {
    let bytes = IsaTabExporter::default().export(&exported_bundle()).unwrap();
    let imported = import_isatab_bytes(&bytes, &mut IdAllocator::default()).unwrap();

    assert_eq!(imported.study.name, "FT greenhouse");
    assert_eq!(
        imported.study.description.as_deref(),
        Some("Flowering time in the greenhouse")
    );
    assert_eq!(imported.study.species, Some(Species::default()));

    let ft10 = imported.traits.iter().find(|t| t.name == "FT10").unwrap();
    assert_eq!(ft10.scoring.as_deref(), Some("days to flowering"));
    assert_eq!(ft10.to_term.as_ref().unwrap().term_id, "TO:0000344");
    assert_eq!(ft10.eo_term.as_ref().unwrap().term_id, "EO:0007404");
    let unit = ft10.uo_term.as_ref().unwrap();
    assert_eq!(unit.term_id, "UO:0000033");
    assert_eq!(unit.term_name.as_deref(), Some("day"));

    let col = imported.accessions.iter().find(|a| a.id == 6909).unwrap();
    assert_eq!(col.name.as_deref(), Some("Col-0"));
    assert!(imported.accessions.iter().find(|a| a.id == 9380).unwrap().name.is_none());

    assert_eq!(imported.publications.len(), 1);
    assert_eq!(imported.publications[0].doi.as_deref(), Some("10.1038/ng.2678"));
    assert_eq!(imported.publications[0].title, "Massive genomic variation");
}

#[test]
fn test_imported_bundle_feeds_matrix_builder() {
    let bytes = IsaTabExporter::default().export(&exported_bundle()).unwrap();
    let imported = import_isatab_bytes(&bytes, &mut IdAllocator::default()).unwrap();
    let study_id = imported.study.id;
    let store = MemoryStore::from_bundle(imported);

    let (identity, matrix) = MatrixBuilder::new(PivotKey::TraitName)
        .build_for_study(&store, study_id)
        .unwrap();
    assert_eq!(identity.len(), 4);
    assert_eq!(matrix.n_cols(), 2);
    assert_eq!(identity.replicate_counts()[&6909], 2);
}

#[test]
fn test_archive_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.zip");
    std::fs::write(&path, IsaTabExporter::default().export(&exported_bundle()).unwrap()).unwrap();

    let imported = import_isatab(&path).unwrap();
    assert_eq!(imported.values.len(), 5);
}

#[test]
fn test_garbage_bytes_are_rejected() {
    let err = import_isatab_bytes(b"not a zip archive", &mut IdAllocator::default()).unwrap_err();
    assert!(matches!(err, PhenoError::Zip(_)));
}
