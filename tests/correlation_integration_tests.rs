// Correlation engine scenarios over an in-memory store

use approx::assert_relative_eq;

use phenotype_core::model::{Accession, ObservationUnit, Study, Trait};
use phenotype_core::{CorrelationEngine, MemoryStore, PhenoError};

/// Traits with values keyed by accession, one observation unit per value
fn store_with(traits: &[(i64, &str, &[(i64, f64)])]) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.add_study(Study::new(1, "panel"));
    let mut unit_id = 0;
    for &(trait_id, name, values) in traits {
        store.add_trait(Trait::new(trait_id, name, 1));
        for &(accession_id, value) in values {
            unit_id += 1;
            store.add_accession(Accession::new(accession_id, None));
            store.add_observation_unit(ObservationUnit { id: unit_id, accession_id, study_id: 1 });
            store.add_value(trait_id, unit_id, value);
        }
    }
    store
}

#[test]
fn test_matrices_are_symmetric() {
    let store = store_with(&[
        (1, "a", &[(10, 1.0), (20, 2.0), (30, 3.5), (40, 3.0)]),
        (2, "b", &[(10, 2.0), (20, 1.0), (30, 5.0), (40, 4.5)]),
        (3, "c", &[(20, 9.0), (30, 7.0), (40, 1.0)]),
    ]);
    let bundle = CorrelationEngine::new(&store).correlate(&[1, 2, 3]).unwrap();

    for m in [&bundle.pearson, &bundle.spearman] {
        assert_eq!(m.size(), 3);
        for i in 0..3 {
            assert_relative_eq!(m.get(i, i).unwrap(), 1.0, epsilon = 1e-12);
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
    }
    assert_eq!(bundle.axes[2].label, "c (panel)");
}

#[test]
fn test_overlap_counts() {
    let store = store_with(&[
        (1, "a", &[(10, 1.0), (20, 2.0), (30, 3.0)]),
        (2, "b", &[(20, 1.0), (30, 4.0), (40, 2.0)]),
    ]);
    let bundle = CorrelationEngine::new(&store).correlate(&[1, 2]).unwrap();

    assert_eq!(bundle.overlaps.len(), 1);
    let venn = &bundle.overlaps[0];
    assert_eq!((venn.a, venn.b, venn.c), (3, 3, 2));
    assert!(venn.c <= venn.a.min(venn.b));
}

#[test]
fn test_replicates_keep_overlap_bounded() {
    let store = store_with(&[
        (1, "a", &[(10, 1.0), (10, 1.5), (20, 2.0), (30, 3.0)]),
        (2, "b", &[(10, 2.0), (20, 2.5), (20, 2.0)]),
    ]);
    let bundle = CorrelationEngine::new(&store).correlate(&[1, 2]).unwrap();
    let venn = &bundle.overlaps[0];
    assert_eq!((venn.a, venn.b, venn.c), (4, 3, 2));
    assert!(venn.c <= venn.a.min(venn.b));
}

#[test]
fn test_unknown_trait_fails_whole_request() {
    let store = store_with(&[
        (1, "a", &[(10, 1.0), (20, 2.0)]),
        (2, "b", &[(10, 3.0), (20, 4.0)]),
    ]);
    let err = CorrelationEngine::new(&store).correlate(&[1, 2, 999]).unwrap_err();
    assert!(matches!(err, PhenoError::TraitNotFound(999)));
    assert!(err.to_string().contains("999"));
}

#[test]
fn test_disjoint_traits_serialize_nan_marker() {
    let store = store_with(&[
        (1, "a", &[(10, 1.0), (20, 2.0)]),
        (2, "b", &[(30, 3.0), (40, 4.0)]),
    ]);
    let bundle = CorrelationEngine::new(&store).correlate(&[1, 2]).unwrap();
    assert_eq!(bundle.pearson.get(0, 1), None);

    let json = serde_json::to_value(&bundle).unwrap();
    assert_eq!(json["pearson"][0][1], "NaN");
    assert_eq!(json["venn"][0]["C"], 0);
    assert_eq!(json["axes"][1]["pheno_id"], 2);
}
