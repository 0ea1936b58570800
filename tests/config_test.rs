use pcu_distortion::config::BackendKind;
use pcu_distortion::{SequenceConfig, SequencePlan};

#[test]
fn test_shipped_config_loads() {
    let config = SequenceConfig::load_from("config/pcu.toml").unwrap();

    assert_eq!(config.dither.grid_size, 3);
    assert_eq!(config.sequence.position_angles, vec![0.0, 45.0, 90.0]);
    assert_eq!(config.backend.kind, BackendKind::Keyword);
    assert_eq!(config.backend.channel.r.read, "k1:ao:pcu:rot:posRb");
    assert_eq!(config.total_frames(), 27);
    assert_eq!(config.sequence.named_position, None);
    assert_eq!(config.named_position(), "pinhole_mask");
    assert_eq!(config.backend.channel.named_preset, "to_pinhole_mask");
}

#[test]
fn test_shipped_grid_is_inside_envelope() {
    let config = SequenceConfig::load_from("config/pcu.toml").unwrap();
    let plan = SequencePlan::build(&config);
    assert!(plan.check_envelope().is_ok());
    assert_eq!(plan.frames, 27);
}
