// SPDX-License-Identifier: MIT
//! HYP1 field walk

use std::io;

use super::{
    Fit, Hyp1Record, FIT_LABEL_LEN, MAX_FIT, MAX_HIT, MAX_TUBE, N_CHI2_COMP, N_COMP_LEN,
};
use crate::codec::{BankSchema, CodecError, FieldReader, FieldWriter};
use crate::format::BANK_HEADER_SIZE;

const R8: usize = 8;
const I4: usize = 4;
const I2: usize = 2;

/// Bytes written regardless of the repeat counts (header excluded)
const FIXED_LEN: usize = I2 + 2 * R8 + 13 * I4 + N_COMP_LEN * I4;
const PER_TUBE_LEN: usize = 3 * R8 + 3 * R8 + I4 + R8 + I4 + R8;
const PER_FIT_TUBE_LEN: usize = 3 * R8;
const PER_HIT_LEN: usize = 3 * R8 + R8 + I4;
const PER_FIT_HIT_LEN: usize = 5 * R8;
const PER_FIT_LEN: usize = 3 * R8 + FIT_LABEL_LEN + 16 * R8 + N_CHI2_COMP * R8 + R8;

/// Largest possible packed HYP1 bank, header included
pub const MAX_BANK_LEN: usize = BANK_HEADER_SIZE
    + FIXED_LEN
    + MAX_TUBE * (PER_TUBE_LEN + MAX_FIT * PER_FIT_TUBE_LEN)
    + MAX_HIT * (PER_HIT_LEN + MAX_FIT * PER_FIT_HIT_LEN)
    + MAX_FIT * PER_FIT_LEN;

type Getter = fn(&Fit) -> f64;
type Setter = fn(&mut Fit, f64);

/// Per-fit scalars packed as columns of `nfit`, in wire order
const FIT_COLUMNS: [(&str, Getter, Setter); 16] = [
    ("rp", |f| f.rp, |f, v| f.rp = v),
    ("d_rp", |f| f.d_rp, |f, v| f.d_rp = v),
    ("psi", |f| f.psi, |f, v| f.psi = v),
    ("d_psi", |f| f.d_psi, |f, v| f.d_psi = v),
    ("t0", |f| f.t0, |f, v| f.t0 = v),
    ("d_t0", |f| f.d_t0, |f, v| f.d_t0 = v),
    ("xcore", |f| f.xcore, |f, v| f.xcore = v),
    ("d_xcore", |f| f.d_xcore, |f, v| f.d_xcore = v),
    ("ycore", |f| f.ycore, |f, v| f.ycore = v),
    ("d_ycore", |f| f.d_ycore, |f, v| f.d_ycore = v),
    ("zen", |f| f.zen, |f, v| f.zen = v),
    ("d_zen", |f| f.d_zen, |f, v| f.d_zen = v),
    ("azm", |f| f.azm, |f, v| f.azm = v),
    ("d_azm", |f| f.d_azm, |f, v| f.d_azm = v),
    ("tc", |f| f.tc, |f, v| f.tc = v),
    ("d_tc", |f| f.d_tc, |f, v| f.d_tc = v),
];

impl BankSchema for Hyp1Record {
    const MAX_BANK_LEN: usize = MAX_BANK_LEN;

    fn validate(&self) -> Result<(), CodecError> {
        Hyp1Record::validate(self)
    }

    fn encode_fields(&self, out: &mut FieldWriter<'_>) {
        out.put_one("event_code", self.event_code);
        out.put_one("tref", self.tref);
        out.put_one("offset", self.offset);
        out.put_one("fd_event_num", self.fd_event_num);
        out.put_one("fd_site_id", self.fd_site_id);
        out.put_one("julian", self.julian);
        out.put_one("jsecond", self.jsecond);
        out.put_one("jsecfrac", self.jsecfrac);

        out.put_one("sd_event_num", self.sd_event_num);
        out.put_one("sd_site_id", self.sd_site_id);
        out.put_one("yymmdd", self.yymmdd);
        out.put_one("hhmmss", self.hhmmss);
        out.put_one("usec", self.usec);

        // Counts were validated against MAX_* so they fit in i32
        out.put_one("nfit", self.nfit() as i32);
        out.put_one("ngtube", self.ngtube() as i32);

        let tubes = &self.tubes;
        for (i, tube) in tubes.iter().enumerate() {
            out.put_at("tube_vector", i, &tube.vector);
        }
        out.put_iter("tube_alt", tubes.iter().map(|t| t.alt));
        out.put_iter("tube_azm", tubes.iter().map(|t| t.azm));
        out.put_iter("tube_sigma", tubes.iter().map(|t| t.sigma));
        out.put_iter("plane_index", tubes.iter().map(|t| t.plane_index));
        out.put_iter("npe", tubes.iter().map(|t| t.npe));
        out.put_iter("fd_time", tubes.iter().map(|t| t.time));
        out.put_iter("fd_time_rms", tubes.iter().map(|t| t.time_rms));

        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("plane_alt", i, fit.plane_alt.as_slice());
            out.put_at("plane_azm", i, fit.plane_azm.as_slice());
        }

        out.put_one("nhits", self.nhits() as i32);
        let hits = &self.hits;
        for (i, hit) in hits.iter().enumerate() {
            out.put_at("xyz", i, &hit.xyz);
        }
        out.put_iter("rho", hits.iter().map(|h| h.rho));
        out.put_iter("rufptn_index", hits.iter().map(|h| h.rufptn_index));

        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("sd_time", i, fit.sd_time.as_slice());
            out.put_at("sd_time_sigma", i, fit.sd_time_sigma.as_slice());
            out.put_at("sd_plane_alt", i, fit.sd_plane_alt.as_slice());
            out.put_at("sd_plane_azm", i, fit.sd_plane_azm.as_slice());
        }

        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("sdp", i, &fit.sdp);
        }
        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("label", i, &fit.label.as_bytes()[..]);
        }

        for (field, get, _) in FIT_COLUMNS {
            out.put_iter(field, self.fits.iter().map(get));
        }

        out.put("n_comp", &self.n_comp);
        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("chi2_comp", i, &fit.chi2_comp);
        }
        out.put_iter("chi2", self.fits.iter().map(|f| f.chi2));

        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("fd_residual", i, fit.fd_residual.as_slice());
        }
        for (i, fit) in self.fits.iter().enumerate() {
            out.put_at("sd_residual", i, fit.sd_residual.as_slice());
        }
    }

    fn decode_fields(&mut self, input: &mut FieldReader<'_>) {
        input.get_one("event_code", &mut self.event_code);
        input.get_one("tref", &mut self.tref);
        input.get_one("offset", &mut self.offset);
        input.get_one("fd_event_num", &mut self.fd_event_num);
        input.get_one("fd_site_id", &mut self.fd_site_id);
        input.get_one("julian", &mut self.julian);
        input.get_one("jsecond", &mut self.jsecond);
        input.get_one("jsecfrac", &mut self.jsecfrac);

        input.get_one("sd_event_num", &mut self.sd_event_num);
        input.get_one("sd_site_id", &mut self.sd_site_id);
        input.get_one("yymmdd", &mut self.yymmdd);
        input.get_one("hhmmss", &mut self.hhmmss);
        input.get_one("usec", &mut self.usec);

        let nfit = input.count("nfit", self.nfit(), MAX_FIT);
        let ngtube = input.count("ngtube", self.ngtube(), MAX_TUBE);
        self.fits.reuse(nfit);
        self.tubes.reuse(ngtube);

        let tubes = self.tubes.as_mut_slice();
        for (i, tube) in tubes.iter_mut().enumerate() {
            input.get_at("tube_vector", i, &mut tube.vector);
        }
        input.get_each::<f64, _>("tube_alt", ngtube, |j, v| tubes[j].alt = v);
        input.get_each::<f64, _>("tube_azm", ngtube, |j, v| tubes[j].azm = v);
        input.get_each::<f64, _>("tube_sigma", ngtube, |j, v| tubes[j].sigma = v);
        input.get_each::<i32, _>("plane_index", ngtube, |j, v| tubes[j].plane_index = v);
        input.get_each::<f64, _>("npe", ngtube, |j, v| tubes[j].npe = v);
        input.get_each::<i32, _>("fd_time", ngtube, |j, v| tubes[j].time = v);
        input.get_each::<f64, _>("fd_time_rms", ngtube, |j, v| tubes[j].time_rms = v);

        for (i, fit) in self.fits.iter_mut().enumerate() {
            for column in fit.tube_columns_mut() {
                column.reuse(ngtube);
            }
            input.get_at("plane_alt", i, fit.plane_alt.as_mut_slice());
            input.get_at("plane_azm", i, fit.plane_azm.as_mut_slice());
        }

        let nhits = input.count("nhits", self.nhits(), MAX_HIT);
        self.hits.reuse(nhits);
        let hits = self.hits.as_mut_slice();
        for (i, hit) in hits.iter_mut().enumerate() {
            input.get_at("xyz", i, &mut hit.xyz);
        }
        input.get_each::<f64, _>("rho", nhits, |j, v| hits[j].rho = v);
        input.get_each::<i32, _>("rufptn_index", nhits, |j, v| hits[j].rufptn_index = v);

        for (i, fit) in self.fits.iter_mut().enumerate() {
            for column in fit.hit_columns_mut() {
                column.reuse(nhits);
            }
            input.get_at("sd_time", i, fit.sd_time.as_mut_slice());
            input.get_at("sd_time_sigma", i, fit.sd_time_sigma.as_mut_slice());
            input.get_at("sd_plane_alt", i, fit.sd_plane_alt.as_mut_slice());
            input.get_at("sd_plane_azm", i, fit.sd_plane_azm.as_mut_slice());
        }

        for (i, fit) in self.fits.iter_mut().enumerate() {
            input.get_at("sdp", i, &mut fit.sdp);
        }
        for (i, fit) in self.fits.iter_mut().enumerate() {
            input.get_at("label", i, &mut fit.label.as_bytes_mut()[..]);
        }

        let fits = self.fits.as_mut_slice();
        for (field, _, set) in FIT_COLUMNS {
            input.get_each::<f64, _>(field, nfit, |i, v| set(&mut fits[i], v));
        }

        input.get("n_comp", &mut self.n_comp);
        for (i, fit) in fits.iter_mut().enumerate() {
            input.get_at("chi2_comp", i, &mut fit.chi2_comp);
        }
        input.get_each::<f64, _>("chi2", nfit, |i, v| fits[i].chi2 = v);

        for (i, fit) in fits.iter_mut().enumerate() {
            input.get_at("fd_residual", i, fit.fd_residual.as_mut_slice());
        }
        for (i, fit) in fits.iter_mut().enumerate() {
            input.get_at("sd_residual", i, fit.sd_residual.as_mut_slice());
        }
    }

    fn render(&self, out: &mut dyn io::Write, verbose: bool) -> io::Result<()> {
        super::dump::render(self, out, verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_bank, encode_bank, ErrorMode};
    use crate::format::HYP1;
    use crate::hyp1::{FdTube, SdHit};
    use crate::pack::{PackBuffer, UnpackCursor};

    fn encode(record: &Hyp1Record) -> Vec<u8> {
        let mut buffer = PackBuffer::with_capacity(MAX_BANK_LEN);
        encode_bank(record, HYP1.header(), &mut buffer, ErrorMode::FailFast).unwrap();
        buffer.as_bytes().to_vec()
    }

    #[test]
    fn test_max_bank_len() {
        assert_eq!(BANK_HEADER_SIZE + FIXED_LEN, 86);
        assert_eq!(MAX_BANK_LEN, 387_542);
    }

    #[test]
    fn test_zero_count_layout() {
        let record = Hyp1Record {
            event_code: 1,
            n_comp: [5, 6],
            ..Hyp1Record::default()
        };
        let bytes = encode(&record);
        assert_eq!(bytes.len(), 86);

        // event_code directly follows the header
        assert_eq!(&bytes[8..10], &1i16.to_le_bytes());
        // n_comp is the last thing written when there are no fits
        assert_eq!(&bytes[78..86], &[5, 0, 0, 0, 6, 0, 0, 0]);
    }

    #[test]
    fn test_field_offsets() {
        let mut record = Hyp1Record {
            julian: 2_455_198,
            ..Hyp1Record::default()
        };
        record.tubes = vec![
            FdTube {
                vector: [1.0, 2.0, 3.0],
                plane_index: 11,
                ..FdTube::default()
            };
            2
        ]
        .into();
        record.hits = vec![SdHit::default()].into();
        record.push_fit("f");

        let bytes = encode(&record);
        let mut cursor = UnpackCursor::new(&bytes);
        cursor.seek(8 + 2 + 16 + 8).unwrap();
        assert_eq!(cursor.unpack_one::<i32>().unwrap(), 2_455_198);

        // nfit and ngtube close the fixed block
        cursor.seek(8 + 2 + 16 + 4 * 10).unwrap();
        assert_eq!(cursor.unpack_one::<i32>().unwrap(), 1);
        assert_eq!(cursor.unpack_one::<i32>().unwrap(), 2);
        // then the first tube vector
        assert_eq!(cursor.unpack_one::<f64>().unwrap(), 1.0);
    }

    #[test]
    fn test_decode_into_default_round_trips() {
        let mut record = Hyp1Record::default();
        record.tubes = (0..4)
            .map(|i| FdTube {
                alt: i as f64 * 0.1,
                time: 100 * i,
                ..FdTube::default()
            })
            .collect();
        record.hits = (0..2)
            .map(|i| SdHit {
                rho: 1.5 * i as f64,
                rufptn_index: i,
                ..SdHit::default()
            })
            .collect();
        let fit = record.push_fit("geometry");
        fit.rp = 12_000.0;
        fit.chi2_comp = [1.0, 2.0, 3.0, 4.0];
        fit.sd_residual[1] = -0.5;

        let bytes = encode(&record);
        let mut back = Hyp1Record::default();
        decode_bank(&mut back, &bytes, ErrorMode::FailFast).unwrap();
        assert_eq!(back, record);
    }
}
