use chrono::{DateTime, Utc};

use crate::models::credentials::PAIRING_CODE;

pub const TUTORIAL_LINK: &str = "https://youtu.be/uF7DBNoKWdU?si=fTZ1xRwHXzdh1M2n";

/// Notification text the caller forwards to the user's chat
pub fn user_message(
    download_link: &str,
    number: &str,
    session_id: &str,
    generated_at: DateTime<Utc>,
) -> String {
    format!(
        "🎯 *TUNZYMD1 PAIRING SUCCESSFUL!*

✅ *Your Session File is Ready*
📁 Download: {download_link}

🔑 *Your Pairing Code:* `{PAIRING_CODE}`

📋 *Session Details:*
• Number: {number}
• Session ID: {session_id}
• Generated: {generated}

🎬 *NEXT STEP - WATCH TUTORIAL:*
🔗 {TUTORIAL_LINK}

⚠️ *IMPORTANT:* Watch the complete tutorial to learn how to use your session file.

🔄 *Need help?* Contact support if you face any issues.

Thank you for using TUNZYMD1 System! 🚀",
        generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
