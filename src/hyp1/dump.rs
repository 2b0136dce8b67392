// SPDX-License-Identifier: MIT
//! Text dump of a HYP1 record
//!
//! The layout is line-compatible with the long-standing DST dump tools,
//! including the missing newline after the FD/SD offset line: each fit block
//! starts with its own newline instead.

use std::f64::consts::PI;
use std::io::{self, Write};

use super::{Fit, Hyp1Record};
use crate::cfmt::{exp, fixed, general};

const R2D: f64 = 180.0 / PI;

/// `%7.5g`, the width used throughout the summary lines
fn g(v: f64) -> String {
    general(v, 7, 5)
}

/// `%13.5f`, the table cell format
fn cell(v: f64) -> String {
    fixed(v, 13, 5)
}

/// Verbose tables convert with `*180/PI` rather than the R2D constant
fn deg(rad: f64) -> String {
    cell(rad * 180.0 / PI)
}

/// Division with the x86 default NaN: `0/0` yields a NaN with the sign bit
/// set, which C prints as `-nan`
fn divide(num: f64, den: f64) -> f64 {
    let quotient = num / den;
    if quotient.is_nan() && !num.is_nan() && !den.is_nan() {
        -f64::NAN
    } else {
        quotient
    }
}

pub(super) fn render(record: &Hyp1Record, out: &mut dyn Write, verbose: bool) -> io::Result<()> {
    writeln!(out, "{} Bank", record.bank_label())?;

    let (year, month, day) = split(record.yymmdd);
    let (hour, min, sec) = split(record.hhmmss);
    writeln!(
        out,
        "Timestamp: {} -- {:02}/{:02}/{:02} -- {:02}:{:02}:{:02}.{:09}",
        record.julian, year, month, day, hour, min, sec, record.tref as i32
    )?;
    write!(out, "FD/SD offset: {} ns", fixed(record.offset, 0, 6))?;

    let nhits = record.nhits() as i64;
    let ngtube = record.ngtube() as i64;
    for (i, fit) in record.fits.iter().enumerate() {
        render_summary(out, fit, i, nhits, ngtube)?;
    }

    if verbose {
        for fit in record.fits.iter() {
            render_tables(out, record, fit)?;
        }
    }
    Ok(())
}

fn split(packed: i32) -> (i32, i32, i32) {
    (packed / 10_000, (packed / 100) % 100, packed % 100)
}

fn render_summary(
    out: &mut dyn Write,
    fit: &Fit,
    index: usize,
    nhits: i64,
    ngtube: i64,
) -> io::Result<()> {
    writeln!(out, "\nFIT: {}", fit.label)?;
    writeln!(
        out,
        "x_c, y_c = {}, {} [km North/East of CLF]",
        g(fit.xcore / 1000.0),
        g(fit.ycore / 1000.0)
    )?;
    writeln!(
        out,
        "zen, azm = {}, {} [degrees]",
        g(fit.zen * R2D),
        g(fit.azm * R2D)
    )?;
    writeln!(out, "tc = {} [microsec after timestamp]", g(fit.tc / 1000.0))?;
    writeln!(
        out,
        "rp, psi = {} km, {} deg",
        g(fit.rp / 1000.0),
        g(fit.psi * R2D)
    )?;
    writeln!(out, "t0 = {} usec", g(fit.t0 / 1000.0))?;

    // The first fit has three free parameters, later ones five
    let free = if index == 0 { 3 } else { 5 };
    writeln!(
        out,
        "chi2 / dof = {} / ({} + {} - {})",
        g(fit.chi2),
        nhits,
        ngtube,
        free
    )?;
    let dof = (nhits + ngtube - free) as f64;
    writeln!(out, "           = {}", g(divide(fit.chi2, dof)))?;

    writeln!(out, "chi2 components:")?;
    writeln!(
        out,
        "{:>11} {:>11} {:>11} {:>11}",
        "SDP", "COC", "FDTiming", "SDTiming"
    )?;
    let comp = &fit.chi2_comp;
    writeln!(
        out,
        "{} {} {} {}",
        exp(comp[2], 11, 3),
        exp(comp[3], 11, 3),
        exp(comp[0], 11, 3),
        exp(comp[1], 11, 3)
    )
}

fn render_tables(out: &mut dyn Write, record: &Hyp1Record, fit: &Fit) -> io::Result<()> {
    writeln!(out, "FIT: {}", fit.label)?;

    writeln!(out, "sd hits: {}", record.nhits())?;
    writeln!(
        out,
        "{:>13} {:>13} {:>13} {:>13} {:>13} {:>13} {:>13} {:>13}",
        "sdPlaneAlt",
        "sdPlaneAzm",
        "rho",
        "sdTime",
        "sdTimeSigma",
        "sdResidual",
        "sdpos X",
        "sdpos Y"
    )?;
    for (j, hit) in record.hits.iter().enumerate() {
        writeln!(
            out,
            "{} {} {} {} {} {} {} {}",
            deg(fit.sd_plane_alt[j]),
            deg(fit.sd_plane_azm[j]),
            cell(hit.rho),
            cell(fit.sd_time[j] / 1000.0),
            cell(fit.sd_time_sigma[j] / 1000.0),
            cell(fit.sd_residual[j]),
            cell(hit.xyz[0] / 1000.0),
            cell(hit.xyz[1] / 1000.0)
        )?;
    }

    writeln!(out, "\nfd tubes: {}", record.ngtube())?;
    writeln!(
        out,
        "{:>13} {:>13} {:>13} {:>13} {:>13} {:>13} {:>13} {:>13} {:>13}",
        "planeAlt",
        "planeAzm",
        "npe",
        "fdTime",
        "fdTimeRMS",
        "fdResidual",
        "tubeVector X",
        "tubeVector Y",
        "tubeVector Z"
    )?;
    for (j, tube) in record.tubes.iter().enumerate() {
        writeln!(
            out,
            "{} {} {} {} {} {} {} {} {}",
            deg(fit.plane_alt[j]),
            deg(fit.plane_azm[j]),
            cell(tube.npe),
            cell(f64::from(tube.time) / 1000.0),
            cell(tube.time_rms / 1000.0),
            cell(fit.fd_residual[j]),
            cell(tube.vector[0]),
            cell(tube.vector[1]),
            cell(tube.vector[2])
        )?;
    }
    Ok(())
}
