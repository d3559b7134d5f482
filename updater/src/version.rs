//! 점 구분 숫자 버전 비교 (외부 크레이트 없이)
//!
//! `N(.N)*` 형식만 허용합니다. 세그먼트 수가 다르면 부족한 뒤쪽 세그먼트를
//! `0`으로 간주하므로 `1.2 == 1.2.0` 입니다.

use std::cmp::Ordering;
use std::fmt;

use crate::error::UpdaterError;

/// 모드팩 버전 (예: "0.31.1")
#[derive(Debug, Clone)]
pub struct PackVersion {
    segments: Vec<u64>,
}

impl PackVersion {
    /// "1.2.3" 형식 파싱. 빈 세그먼트, 부호, 숫자 이외 문자는 거부
    pub fn parse(s: &str) -> Result<Self, UpdaterError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(UpdaterError::MalformedVersion(s.to_string()));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(UpdaterError::MalformedVersion(s.to_string()));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| UpdaterError::MalformedVersion(s.to_string()))?;
            segments.push(value);
        }

        Ok(Self { segments })
    }
}

/// 두 버전 문자열 비교
pub fn compare(a: &str, b: &str) -> Result<Ordering, UpdaterError> {
    Ok(PackVersion::parse(a)?.cmp(&PackVersion::parse(b)?))
}

/// `a`가 `b`보다 새로운지
pub fn is_newer(a: &str, b: &str) -> Result<bool, UpdaterError> {
    Ok(compare(a, b)? == Ordering::Greater)
}

impl fmt::Display for PackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, seg) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl Ord for PackVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for idx in 0..len {
            let a = self.segments.get(idx).copied().unwrap_or(0);
            let b = other.segments.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for PackVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Eq는 Ord와 일치해야 함 (1.2 == 1.2.0)
impl PartialEq for PackVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackVersion {}
