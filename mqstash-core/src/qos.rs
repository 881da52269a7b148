#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
    Invalid = 0xff,
}

impl From<u8> for QoS {
    fn from(n: u8) -> Self {
        match n {
            0x00 => QoS::AtMostOnce,
            0x01 => QoS::AtLeastOnce,
            0x02 => QoS::ExactlyOnce,
            _ => QoS::Invalid,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

#[cfg(test)]
mod tests {
    use crate::qos::QoS;

    #[test]
    fn test_qos_from_u8() {
        let mut result: QoS = 0x00u8.into();
        assert_eq!(QoS::AtMostOnce, result);

        result = 0x01u8.into();
        assert_eq!(QoS::AtLeastOnce, result);

        result = 0x02u8.into();
        assert_eq!(QoS::ExactlyOnce, result);

        result = 0x03u8.into();
        assert_eq!(QoS::Invalid, result);
    }

    #[test]
    fn test_qos_into_u8() {
        assert_eq!(u8::from(QoS::ExactlyOnce), 2);
        assert_eq!(u8::from(QoS::Invalid), 0xff);
    }
}
