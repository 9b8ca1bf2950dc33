use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use squall_common::StoreError;

/// Conversão de um valor escalar para a forma textual canônica armazenada.
///
/// Tipos próprios implementam este trait para oferecer sua própria codificação.
pub trait Marshal {
    fn marshal(&self) -> Result<String, StoreError>;
}

macro_rules! marshal_display {
    ($($t:ty),* $(,)?) => {
        $(
            impl Marshal for $t {
                fn marshal(&self) -> Result<String, StoreError> {
                    Ok(self.to_string())
                }
            }
        )*
    };
}

marshal_display!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char, str, String,
);

impl Marshal for bool {
    fn marshal(&self) -> Result<String, StoreError> {
        Ok(if *self { "1" } else { "0" }.to_string())
    }
}

impl Marshal for [u8] {
    fn marshal(&self) -> Result<String, StoreError> {
        std::str::from_utf8(self)
            .map(str::to_owned)
            .map_err(|e| StoreError::Marshal(format!("bytes não são UTF-8: {e}")))
    }
}

impl Marshal for Vec<u8> {
    fn marshal(&self) -> Result<String, StoreError> {
        self.as_slice().marshal()
    }
}

impl Marshal for Bytes {
    fn marshal(&self) -> Result<String, StoreError> {
        self.as_ref().marshal()
    }
}

/// Durações viram nanossegundos.
impl Marshal for Duration {
    fn marshal(&self) -> Result<String, StoreError> {
        Ok(self.as_nanos().to_string())
    }
}

impl<Tz: TimeZone> Marshal for DateTime<Tz> {
    fn marshal(&self) -> Result<String, StoreError> {
        Ok(self
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}

impl Marshal for SystemTime {
    fn marshal(&self) -> Result<String, StoreError> {
        DateTime::<Utc>::from(*self).marshal()
    }
}

impl<T: Marshal + ?Sized> Marshal for &T {
    fn marshal(&self) -> Result<String, StoreError> {
        (**self).marshal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_use_canonical_text() {
        assert_eq!(42i64.marshal().unwrap(), "42");
        assert_eq!((-7i8).marshal().unwrap(), "-7");
        assert_eq!(1.5f64.marshal().unwrap(), "1.5");
        assert_eq!(true.marshal().unwrap(), "1");
        assert_eq!(false.marshal().unwrap(), "0");
        assert_eq!("texto".marshal().unwrap(), "texto");
    }

    #[test]
    fn durations_are_nanoseconds() {
        assert_eq!(Duration::from_millis(3).marshal().unwrap(), "3000000");
    }

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(t.marshal().unwrap(), "2024-05-01T12:30:00.000000000Z");

        let epoch = SystemTime::UNIX_EPOCH.marshal().unwrap();
        assert_eq!(epoch, "1970-01-01T00:00:00.000000000Z");
    }

    #[test]
    fn invalid_utf8_bytes_fail() {
        let raw = vec![0xff, 0xfe];
        assert!(matches!(raw.marshal(), Err(StoreError::Marshal(_))));
        assert_eq!(Bytes::from_static(b"ok").marshal().unwrap(), "ok");
    }

    struct Point(i32, i32);

    impl Marshal for Point {
        fn marshal(&self) -> Result<String, StoreError> {
            Ok(format!("{},{}", self.0, self.1))
        }
    }

    #[test]
    fn custom_types_bring_their_own_encoding() {
        assert_eq!(Point(3, -4).marshal().unwrap(), "3,-4");
        assert_eq!((&Point(1, 2)).marshal().unwrap(), "1,2");
    }
}
