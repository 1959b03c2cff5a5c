//! Integration test: pipeline construction and fitting

use ndarray::array;
use tabreg::pipeline::{create_pipeline, ModelConfig, ModelKind, Regressor, Stage, MODEL_STEP, SCALER_STEP};
use tabreg::training::{ModelParams, ParamValue};

fn params(entries: &[(&str, ParamValue)]) -> ModelParams {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_scaled_pipeline_has_scaler_then_model() {
    for kind in ModelKind::ALL {
        let pipeline = create_pipeline(kind.as_str(), true, 1234, &ModelParams::new()).unwrap();
        let names: Vec<&str> = pipeline.steps().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![SCALER_STEP, MODEL_STEP]);
        assert!(matches!(pipeline.steps()[0].1, Stage::Scaler(_)));
        assert_eq!(pipeline.kind(), kind);
    }
}

#[test]
fn test_unscaled_pipeline_has_only_model() {
    let pipeline = create_pipeline("svm", false, 1234, &ModelParams::new()).unwrap();
    assert_eq!(pipeline.len(), 1);
    assert_eq!(pipeline.steps()[0].0, MODEL_STEP);
    assert!(pipeline.scaler().is_none());
}

#[test]
fn test_lasso_receives_params_and_seed() {
    let pipeline = create_pipeline("lasso", true, 1234, &params(&[("alpha", ParamValue::Float(0.1))])).unwrap();
    match pipeline.model() {
        Regressor::Lasso(m) => {
            assert_eq!(m.alpha, 0.1);
            assert_eq!(m.random_state, Some(1234));
        }
        other => panic!("expected lasso, got {:?}", other.kind()),
    }
}

#[test]
fn test_random_forest_receives_params_and_seed() {
    let pipeline = create_pipeline(
        "random_forest",
        false,
        7,
        &params(&[("n_estimators", ParamValue::Int(50)), ("max_depth", ParamValue::Int(10))]),
    )
    .unwrap();
    match pipeline.model() {
        Regressor::RandomForest(m) => {
            assert_eq!(m.n_estimators, 50);
            assert_eq!(m.max_depth, Some(10));
            assert_eq!(m.random_state, Some(7));
        }
        other => panic!("expected random_forest, got {:?}", other.kind()),
    }
}

#[test]
fn test_linear_and_svm_ignore_seed() {
    let linear = create_pipeline("linear", true, 99, &ModelParams::new()).unwrap();
    assert_eq!(linear.model().random_state(), None);

    let svm = create_pipeline("svm", true, 99, &params(&[("C", ParamValue::Float(2.0))])).unwrap();
    assert_eq!(svm.model().random_state(), None);
    match svm.model() {
        Regressor::Svm(m) => assert_eq!(m.c, 2.0),
        other => panic!("expected svm, got {:?}", other.kind()),
    }
}

#[test]
fn test_invalid_model_type() {
    let err = create_pipeline("xgboost", true, 1234, &ModelParams::new()).unwrap_err();
    assert!(err.to_string().contains("Invalid model type: xgboost"));
}

#[test]
fn test_unknown_param_is_rejected() {
    let err = create_pipeline("linear", true, 1234, &params(&[("n_estimators", ParamValue::Int(3))])).unwrap_err();
    assert!(err.to_string().contains("n_estimators"));
}

#[test]
fn test_every_kind_fits_small_matrix() {
    let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
    let y = array![1.0, 2.0, 3.0];

    for kind in ModelKind::ALL {
        for scale in [true, false] {
            let mut pipeline = create_pipeline(kind.as_str(), scale, 1234, &ModelParams::new()).unwrap();
            pipeline.fit(&x, &y).unwrap();
            let pred = pipeline.predict(&x).unwrap();
            assert_eq!(pred.len(), 3, "{} (scale={})", kind, scale);
            assert!(pred.iter().all(|v| v.is_finite()), "{} (scale={})", kind, scale);
        }
    }
}

#[test]
fn test_same_seed_same_forest() {
    let x = array![[1.0, 0.5], [2.0, 1.5], [3.0, 0.2], [4.0, 2.5], [5.0, 1.0], [6.0, 3.0]];
    let y = array![1.0, 2.5, 2.0, 4.5, 4.0, 6.5];
    let cfg = ModelConfig {
        model_type: "random_forest".to_string(),
        params: params(&[("n_estimators", ParamValue::Int(10))]),
        ..Default::default()
    };

    let mut a = cfg.instantiate().unwrap();
    let mut b = cfg.instantiate().unwrap();
    a.fit(&x, &y).unwrap();
    b.fit(&x, &y).unwrap();
    assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
}
