/// 通知カタログ: (曜日 × チャネル) → メッセージの固定マトリクス。
///
/// メッセージは曜日毎に一つで、3チャネルすべてに同文を配る。
/// プロセス起動時に一度だけ冪等にシードされる。
use crate::store::dao::SeedDefinition;
use crate::store::models::Channel;

/// 月曜=0..日曜=6。
pub(crate) const WEEKDAY_MESSAGES: [&str; 7] = [
    "한 주의 시작, 많이 힘드셨죠? 하지만 잘 해내셨으니 앞으로도 잘 하실거에요! 💪",
    "조금 지치셨나요? 남은 날들은 즐거운 일만 가득할 거에요. 🌿",
    "벌써 반 이상 왔습니다! 조금만 더 힘내봐요. 📝",
    "오늘도 많이 힘드셨죠? 내일만 지나면 주말이다! 힘든 마음을 챙겨보세요. 🧘",
    "주말이 다가옵니다. 부정적 감정을 놓아주세요. 🎵",
    "이번 주 부정적 감정이 많았다면, 주말에 휴식하세요. ☕",
    "다음 주를 위해 감정을 정리하고 준비하세요. 🌸",
];

/// シード対象の全定義（7曜日 × 3チャネル = 21行）。
#[must_use]
pub(crate) fn seed_definitions() -> Vec<SeedDefinition> {
    let mut definitions = Vec::with_capacity(WEEKDAY_MESSAGES.len() * Channel::ALL.len());
    for (weekday, message) in WEEKDAY_MESSAGES.iter().enumerate() {
        let weekday = i16::try_from(weekday).expect("weekday fits i16");
        for channel in Channel::ALL {
            definitions.push(SeedDefinition {
                weekday,
                channel,
                message,
            });
        }
    }
    definitions
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn seed_covers_every_weekday_channel_pair_exactly_once() {
        let definitions = seed_definitions();
        assert_eq!(definitions.len(), 21);

        let pairs: HashSet<(i16, Channel)> = definitions
            .iter()
            .map(|d| (d.weekday, d.channel))
            .collect();
        assert_eq!(pairs.len(), 21);
        for weekday in 0..7_i16 {
            for channel in Channel::ALL {
                assert!(pairs.contains(&(weekday, channel)));
            }
        }
    }

    #[test]
    fn all_channels_share_the_weekday_message() {
        let definitions = seed_definitions();
        let monday: Vec<_> = definitions.iter().filter(|d| d.weekday == 0).collect();
        assert_eq!(monday.len(), 3);
        for definition in monday {
            assert_eq!(definition.message, WEEKDAY_MESSAGES[0]);
        }
    }
}
