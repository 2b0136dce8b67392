// SPDX-License-Identifier: MIT
//! Property-based tests using proptest
//!
//! These tests generate random HYP1 records and check the invariants every
//! valid record must satisfy: lossless round trips, the bank length formula,
//! and robustness against truncated input.

use proptest::prelude::*;

use dst_bank::cfmt::{exp, fixed, general};
use dst_bank::hyp1::{MAX_FIT, N_CHI2_COMP};
use dst_bank::{BankCodec, CodecConfig, ErrorMode, FdTube, Fit, Hyp1Record, SdHit, Slots};

/// Strategy for finite values in a physically plausible range
fn value() -> impl Strategy<Value = f64> {
    -1.0e6..1.0e6f64
}

/// Strategy for printable fit labels
fn label_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _-]{0,40}"
}

fn tube_strategy() -> impl Strategy<Value = FdTube> {
    (
        prop::array::uniform3(value()),
        value(),
        value(),
        value(),
        any::<i32>(),
        value(),
        any::<i32>(),
        value(),
    )
        .prop_map(
            |(vector, alt, azm, sigma, plane_index, npe, time, time_rms)| FdTube {
                vector,
                alt,
                azm,
                sigma,
                plane_index,
                npe,
                time,
                time_rms,
            },
        )
}

fn hit_strategy() -> impl Strategy<Value = SdHit> {
    (prop::array::uniform3(value()), value(), any::<i32>()).prop_map(|(xyz, rho, rufptn_index)| {
        SdHit {
            xyz,
            rho,
            rufptn_index,
        }
    })
}

/// Strategy for a fit sized to `ngtube` tubes and `nhits` hits
fn fit_strategy(ngtube: usize, nhits: usize) -> impl Strategy<Value = Fit> {
    (
        label_strategy(),
        prop::array::uniform3(value()),
        prop::collection::vec(value(), 16),
        prop::array::uniform4(value()),
        value(),
        prop::collection::vec(value(), 3 * ngtube),
        prop::collection::vec(value(), 5 * nhits),
    )
        .prop_map(
            move |(label, sdp, params, chi2_comp, chi2, tube_values, hit_values)| {
                let mut fit = Fit::with_observations(&label, ngtube, nhits);
                fit.sdp = sdp;
                fit.rp = params[0];
                fit.d_rp = params[1];
                fit.psi = params[2];
                fit.d_psi = params[3];
                fit.t0 = params[4];
                fit.d_t0 = params[5];
                fit.xcore = params[6];
                fit.d_xcore = params[7];
                fit.ycore = params[8];
                fit.d_ycore = params[9];
                fit.zen = params[10];
                fit.d_zen = params[11];
                fit.azm = params[12];
                fit.d_azm = params[13];
                fit.tc = params[14];
                fit.d_tc = params[15];
                fit.chi2_comp = chi2_comp;
                fit.chi2 = chi2;
                for j in 0..ngtube {
                    fit.plane_alt[j] = tube_values[3 * j];
                    fit.plane_azm[j] = tube_values[3 * j + 1];
                    fit.fd_residual[j] = tube_values[3 * j + 2];
                }
                for j in 0..nhits {
                    fit.sd_time[j] = hit_values[5 * j];
                    fit.sd_time_sigma[j] = hit_values[5 * j + 1];
                    fit.sd_plane_alt[j] = hit_values[5 * j + 2];
                    fit.sd_plane_azm[j] = hit_values[5 * j + 3];
                    fit.sd_residual[j] = hit_values[5 * j + 4];
                }
                fit
            },
        )
}

/// Strategy for valid records with small repeat counts
fn record_strategy() -> impl Strategy<Value = Hyp1Record> {
    (0..=MAX_FIT, 0..=20usize, 0..=10usize)
        .prop_flat_map(|(nfit, ngtube, nhits)| {
            (
                prop::collection::vec(tube_strategy(), ngtube),
                prop::collection::vec(hit_strategy(), nhits),
                prop::collection::vec(fit_strategy(ngtube, nhits), nfit),
                any::<i16>(),
                value(),
                prop::array::uniform10(any::<i32>()),
                prop::array::uniform2(any::<i32>()),
            )
        })
        .prop_map(|(tubes, hits, fits, event_code, offset, ids, n_comp)| Hyp1Record {
            event_code,
            tref: offset.abs(),
            offset,
            fd_event_num: ids[0],
            fd_site_id: ids[1],
            julian: ids[2],
            jsecond: ids[3],
            jsecfrac: ids[4],
            sd_event_num: ids[5],
            sd_site_id: ids[6],
            yymmdd: ids[7],
            hhmmss: ids[8],
            usec: ids[9],
            n_comp,
            tubes: tubes.into(),
            hits: hits.into(),
            fits: fits.into(),
        })
}

fn encode(record: &Hyp1Record) -> Vec<u8> {
    let mut codec = BankCodec::hyp1();
    codec.set_record(record.clone());
    codec.encode().unwrap();
    codec.buffer().unwrap().to_vec()
}

proptest! {
    /// Every valid record decodes back to itself
    #[test]
    fn record_round_trip(record in record_strategy()) {
        let bank = encode(&record);
        let mut codec = BankCodec::hyp1();
        prop_assert!(codec.decode_checked(&bank).is_ok());
        prop_assert_eq!(codec.record(), &record);
    }

    /// The bank length depends only on the three repeat counts
    #[test]
    fn bank_length_formula(record in record_strategy()) {
        let (nfit, ngtube, nhits) = (record.nfit(), record.ngtube(), record.nhits());
        let expected = 86
            + ngtube * 72
            + nfit * ngtube * 24
            + nhits * 36
            + nfit * nhits * 40
            + nfit * (24 + 128 + 16 * 8 + N_CHI2_COMP * 8 + 8);
        prop_assert_eq!(encode(&record).len(), expected);
    }

    /// Stale entries left by an earlier decode never leak into the result
    #[test]
    fn decode_into_used_record(first in record_strategy(), second in record_strategy()) {
        let mut codec = BankCodec::hyp1();
        codec.decode(&encode(&first)).unwrap();
        codec.decode(&encode(&second)).unwrap();
        prop_assert_eq!(codec.record(), &second);
    }

    /// Truncated banks are reported, never decoded silently
    #[test]
    fn truncated_bank_fails(record in record_strategy(), cut in 0.0..1.0f64) {
        let bank = encode(&record);
        let len = 8 + ((bank.len() - 8) as f64 * cut) as usize;
        prop_assume!(len < bank.len());

        let mut fail_fast = BankCodec::hyp1();
        let err = fail_fast.decode(&bank[..len]).unwrap_err();
        prop_assert_eq!(err.legacy_status(), 1);

        let config = CodecConfig::default().with_error_mode(ErrorMode::Accumulate);
        let mut accumulate = BankCodec::hyp1_with_config(config);
        let err = accumulate.decode(&bank[..len]).unwrap_err();
        prop_assert!(err.legacy_status() >= 1);
        prop_assert_eq!(err.legacy_status() as usize, err.failures().len());
    }

    /// Shrinking keeps the dropped entries as a stale tail
    #[test]
    fn slots_reuse_keeps_tail(values in prop::collection::vec(any::<i32>(), 0..50), len in 0..60usize) {
        let mut slots = Slots::from_vec(values.clone());
        slots.reuse(len);
        prop_assert_eq!(slots.len(), len);
        if len <= values.len() {
            prop_assert_eq!(slots.as_slice(), &values[..len]);
            prop_assert_eq!(slots.stale_tail(), &values[len..]);
        } else {
            prop_assert_eq!(&slots.as_slice()[..values.len()], values.as_slice());
            prop_assert!(slots.as_slice()[values.len()..].iter().all(|&v| v == 0));
        }
    }

    /// `%7.5g` keeps five significant digits and the minimum width
    #[test]
    fn general_format_precision(v in value()) {
        let text = general(v, 7, 5);
        prop_assert!(text.len() >= 7);
        let parsed: f64 = text.trim().parse().unwrap();
        prop_assert!((parsed - v).abs() <= v.abs() * 1e-4);
    }

    /// `%11.3e` always prints a mantissa and a signed two-digit exponent
    #[test]
    fn exp_format_shape(v in value()) {
        let text = exp(v, 11, 3);
        prop_assert!(text.len() >= 11);
        let (mantissa, exponent) = text.trim().split_once('e').unwrap();
        prop_assert_eq!(mantissa.trim_start_matches('-').len(), 5);
        prop_assert!(exponent.starts_with('+') || exponent.starts_with('-'));
        prop_assert!(exponent.len() >= 3);
    }

    /// `%13.5f` rounds to five decimals
    #[test]
    fn fixed_format_precision(v in value()) {
        let text = fixed(v, 13, 5);
        prop_assert!(text.len() >= 13);
        let parsed: f64 = text.trim().parse().unwrap();
        prop_assert!((parsed - v).abs() <= 1e-5);
    }
}
