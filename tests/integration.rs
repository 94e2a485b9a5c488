use approx::assert_abs_diff_eq;
use chanavg::{
    cli::main_with_args, ndarray::array, ChanAvgError, ChanBin, ChannelAverageTvi, Complex,
    FrequencyFrame,
};

mod common;
use common::{chanavg_ctx, ramp_buffer};

#[test]
fn test_stream_of_spws() {
    let ctx = chanavg_ctx(ChanBin::PerSpw(vec![4, 3]), &[(0, 8), (1, 7)]);
    let mut tvi = ChannelAverageTvi::new(ramp_buffer(0, (2, 8, 3)), &ctx).unwrap();

    assert_eq!(tvi.shape().unwrap(), (2, 2, 3));
    let vis = tvi.visibility_observed().unwrap();
    assert_abs_diff_eq!(vis[(1, 0, 2)], Complex::new(1.5, 0.));
    assert_abs_diff_eq!(vis[(0, 1, 0)], Complex::new(5.5, 0.));
    assert_abs_diff_eq!(tvi.visibility_model().unwrap()[(0, 1, 0)], Complex::new(11., 0.));
    assert_abs_diff_eq!(
        tvi.visibility_corrected().unwrap()[(0, 0, 0)],
        Complex::new(4.5, 0.)
    );
    assert_abs_diff_eq!(tvi.weight_spectrum().unwrap()[(0, 0, 0)], 4.);
    assert_abs_diff_eq!(tvi.sigma_spectrum().unwrap()[(0, 0, 0)], 0.5, epsilon = 1e-6);

    // the upstream moves on to the next spectral window
    *tvi.upstream_mut() = ramp_buffer(1, (2, 7, 3));

    assert_eq!(tvi.shape().unwrap(), (2, 3, 3));
    let vis = tvi.visibility_observed().unwrap();
    assert_abs_diff_eq!(vis[(0, 0, 0)], Complex::new(1., 0.));
    assert_abs_diff_eq!(vis[(0, 1, 0)], Complex::new(4., 0.));
    assert_abs_diff_eq!(vis[(0, 2, 0)], Complex::new(6., 0.));

    let weights = tvi.weight_spectrum().unwrap();
    assert_abs_diff_eq!(weights[(1, 1, 1)], 3.);
    assert_abs_diff_eq!(weights[(1, 2, 1)], 1.);

    let sigmas = tvi.sigma_spectrum().unwrap();
    assert_abs_diff_eq!(sigmas[(0, 0, 0)], 1. / 3_f32.sqrt(), epsilon = 1e-6);
    assert_abs_diff_eq!(sigmas[(0, 2, 0)], 1., epsilon = 1e-6);

    let freqs = tvi
        .frequencies(0., FrequencyFrame::Topocentric, 1, 0)
        .unwrap();
    assert_abs_diff_eq!(freqs, array![150.04e6, 150.16e6, 150.24e6], epsilon = 1e-6);
    let widths = tvi.channel_widths(1, 0).unwrap();
    assert_abs_diff_eq!(widths, array![120e3, 120e3, 40e3], epsilon = 1e-6);
}

#[test]
fn test_unweighted_average_prefers_unflagged() {
    let mut buffer = ramp_buffer(0, (1, 6, 1));
    buffer.weights = None;
    // channel 0 flagged, channels 3, 4 and 5 flagged
    buffer.flags[(0, 0, 0)] = true;
    buffer.flags[(0, 3, 0)] = true;
    buffer.flags[(0, 4, 0)] = true;
    buffer.flags[(0, 5, 0)] = true;
    let tvi = ChannelAverageTvi::new(buffer, &chanavg_ctx(ChanBin::Uniform(3), &[(0, 6)])).unwrap();

    let vis = tvi.visibility_observed().unwrap();
    // channel 0 is discarded once channel 1 is seen
    assert_abs_diff_eq!(vis[(0, 0, 0)], Complex::new(1.5, 0.));
    // an entirely flagged bin is still averaged
    assert_abs_diff_eq!(vis[(0, 1, 0)], Complex::new(4., 0.));

    let flags = tvi.flag().unwrap();
    assert!(!flags[(0, 0, 0)]);
    assert!(flags[(0, 1, 0)]);
}

#[test]
fn test_flag_edit_round_trip() {
    let mut buffer = ramp_buffer(2, (2, 10, 4));
    buffer.flags[(1, 9, 3)] = true;
    let original = buffer.flags.clone();
    let mut tvi =
        ChannelAverageTvi::new(buffer, &chanavg_ctx(ChanBin::Uniform(4), &[(2, 10)])).unwrap();

    // writing back the unedited flags changes nothing
    let averaged = tvi.flag().unwrap();
    assert_eq!(averaged.dim(), (2, 3, 4));
    tvi.write_flag(averaged.view()).unwrap();
    assert_eq!(tvi.upstream().flags, original);

    let mut edited = averaged;
    edited[(0, 1, 2)] = true;
    edited[(1, 2, 0)] = true;
    tvi.write_flag(edited.view()).unwrap();

    let flags = &tvi.upstream().flags;
    for ((corr, chan, row), &flag) in flags.indexed_iter() {
        let expected = original[(corr, chan, row)] || edited[(corr, chan / 4, row)];
        assert_eq!(flag, expected, "corr {corr} chan {chan} row {row}");
    }
    assert_eq!(flags.iter().filter(|&&flag| flag).count(), 1 + 4 + 2);

    // the ragged bin is now fully flagged at averaged resolution
    assert!(tvi.flag().unwrap()[(1, 2, 0)]);
}

#[test]
fn test_upstream_shape_change_is_fatal() {
    let ctx = chanavg_ctx(ChanBin::Uniform(2), &[(0, 8)]);
    let mut tvi = ChannelAverageTvi::new(ramp_buffer(0, (4, 8, 3)), &ctx).unwrap();
    tvi.visibility_observed().unwrap();

    *tvi.upstream_mut() = ramp_buffer(0, (2, 8, 3));
    assert!(matches!(
        tvi.visibility_observed(),
        Err(ChanAvgError::ShapeChanged { spw: 0, .. })
    ));
}

#[test]
fn test_cli_plan() {
    assert_eq!(
        main_with_args(&["chanavg", "--chanbin", "4,3", "--spw", "0:8", "1:7"]),
        0
    );
    assert_eq!(
        main_with_args(&["chanavg", "--dry-run", "--chanbin", "4", "--spw", "0:8"]),
        0
    );
    assert_eq!(
        main_with_args(&["chanavg", "--chanbin", "4,3", "--spw", "0:8"]),
        1
    );
}
